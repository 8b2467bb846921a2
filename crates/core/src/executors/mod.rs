// Node executors and the registry that dispatches on node type

mod http_request;
mod initial;
mod manual_trigger;

pub use http_request::{HttpRequestExecutor, HttpSettings};
pub use initial::InitialNodeExecutor;
pub use manual_trigger::ManualTriggerExecutor;

use crate::error::{WorkflowError, WorkflowResult};
use crate::types::{ExecutionId, ExecutionResult, NodeId, NodeType, OutputData, WorkflowId};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an executor sees for one node invocation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    /// The node's own configuration
    pub node_data: OutputData,
    /// Output of the previous node (or the run's initial data)
    pub previous_data: OutputData,
    pub environment: HashMap<String, String>,
}

/// Runs one node type
///
/// Node-level failures are reported as `ExecutionResult::failure` and end the
/// run. An `Err` means the invocation itself broke and the step host may
/// retry it, so executors with side effects should only return `Err` before
/// the side effect happens.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Node type this executor handles
    fn node_type(&self) -> NodeType;

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionResult>;
}

/// Maps node types to executors; read-only once built
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry with an executor for every built-in node type
    pub fn with_defaults(http: HttpSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(InitialNodeExecutor));
        registry.register(Arc::new(ManualTriggerExecutor));
        registry.register(Arc::new(HttpRequestExecutor::new(http)?));
        Ok(registry)
    }

    /// Register an executor, replacing any previous one for the same type
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let node_type = executor.node_type();
        if self.executors.insert(node_type, executor).is_some() {
            tracing::debug!("Replaced executor for node type {}", node_type);
        }
    }

    pub fn get_executor(&self, node_type: NodeType) -> WorkflowResult<Arc<dyn Executor>> {
        self.executors
            .get(&node_type)
            .cloned()
            .ok_or(WorkflowError::UnknownNodeType(node_type))
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.executors.contains_key(&node_type)
    }

    /// Node types that have no executor registered
    pub fn missing_types(&self) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|t| !self.contains(*t))
            .collect()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
