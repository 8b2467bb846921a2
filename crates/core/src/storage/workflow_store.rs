use crate::error::{WorkflowError, WorkflowResult};
use crate::types::{WorkflowGraph, WorkflowId};
use anyhow::Context;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Read access to stored workflow graphs
#[async_trait::async_trait]
pub trait WorkflowLoader: Send + Sync {
    /// Load a workflow with its nodes and connections; unknown ids are an error
    async fn load_workflow_with_graph(&self, workflow_id: &WorkflowId) -> WorkflowResult<WorkflowGraph>;
}

/// Workflow graphs held in memory
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, WorkflowGraph>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, workflow: WorkflowGraph) {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
    }

    pub async fn remove(&self, workflow_id: &WorkflowId) -> Option<WorkflowGraph> {
        self.workflows.write().await.remove(workflow_id)
    }
}

#[async_trait::async_trait]
impl WorkflowLoader for InMemoryWorkflowStore {
    async fn load_workflow_with_graph(&self, workflow_id: &WorkflowId) -> WorkflowResult<WorkflowGraph> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.clone()))
    }
}

/// Workflow graphs stored as `<workflowId>.json` files in a directory
#[derive(Clone)]
pub struct JsonWorkflowStore {
    base_path: PathBuf,
}

impl JsonWorkflowStore {
    pub fn new(base_path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&base_path)
            .context("Failed to create workflow directory")?;
        Ok(Self { base_path })
    }

    fn workflow_path(&self, workflow_id: &WorkflowId) -> Option<PathBuf> {
        // Ids become file names, so keep them to a single plain path segment
        let id = workflow_id.as_str();
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        safe.then(|| self.base_path.join(format!("{}.json", id)))
    }

    /// Write a workflow graph to disk
    pub async fn save(&self, workflow: &WorkflowGraph) -> anyhow::Result<()> {
        let path = self
            .workflow_path(&workflow.id)
            .with_context(|| format!("Invalid workflow id {}", workflow.id))?;
        let json = serde_json::to_vec_pretty(workflow).context("Failed to serialize workflow")?;
        tokio::fs::write(&path, json)
            .await
            .context("Failed to write workflow file")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowLoader for JsonWorkflowStore {
    async fn load_workflow_with_graph(&self, workflow_id: &WorkflowId) -> WorkflowResult<WorkflowGraph> {
        let not_found = || WorkflowError::WorkflowNotFound(workflow_id.clone());

        let path = self.workflow_path(workflow_id).ok_or_else(not_found)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(WorkflowError::Transient(
                    anyhow::Error::new(e).context("Failed to read workflow file"),
                ))
            }
        };

        let mut workflow: WorkflowGraph = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse workflow {}", path.display()))
            .map_err(WorkflowError::Storage)?;

        if workflow.id != *workflow_id {
            tracing::warn!(
                "Workflow file {} declares id {}, using {}",
                path.display(),
                workflow.id,
                workflow_id
            );
            workflow.id = workflow_id.clone();
        }

        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_store_missing_workflow() {
        let store = InMemoryWorkflowStore::new();
        store
            .insert(WorkflowGraph::new("wf").node("t", NodeType::ManualTrigger))
            .await;

        let loaded = store
            .load_workflow_with_graph(&WorkflowId::new("wf"))
            .await
            .unwrap();
        assert_eq!(loaded.nodes.len(), 1);

        assert!(matches!(
            store.load_workflow_with_graph(&WorkflowId::new("nope")).await,
            Err(WorkflowError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_json_store_round_trip_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = JsonWorkflowStore::new(dir.path().to_path_buf()).unwrap();

        let workflow = WorkflowGraph::new("wf-1")
            .node("t", NodeType::ManualTrigger)
            .node("h", NodeType::HttpRequest)
            .connect("t", "h");
        store.save(&workflow).await.unwrap();

        let loaded = store
            .load_workflow_with_graph(&WorkflowId::new("wf-1"))
            .await
            .unwrap();
        assert_eq!(loaded.connections.len(), 1);
        assert_eq!(loaded.nodes[1].node_type, NodeType::HttpRequest);

        assert!(matches!(
            store.load_workflow_with_graph(&WorkflowId::new("missing")).await,
            Err(WorkflowError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            store.load_workflow_with_graph(&WorkflowId::new("../etc/passwd")).await,
            Err(WorkflowError::WorkflowNotFound(_))
        ));
    }
}
