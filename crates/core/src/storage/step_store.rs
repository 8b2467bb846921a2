use crate::types::ExecutionId;
use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keyed by (execution id, step name)
const STEPS_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("steps");

/// Persisted results of completed steps, keyed by execution and step name
#[async_trait::async_trait]
pub trait StepStore: Send + Sync {
    /// Memoized output of a step, if it completed before
    async fn load(&self, execution_id: &ExecutionId, step: &str) -> Result<Option<serde_json::Value>>;

    /// Record a completed step's output
    async fn save(&self, execution_id: &ExecutionId, step: &str, output: &serde_json::Value) -> Result<()>;

    /// Names of completed steps for an execution, sorted
    async fn completed_steps(&self, execution_id: &ExecutionId) -> Result<Vec<String>>;
}

/// Step store that lives for the process only
#[derive(Default)]
pub struct InMemoryStepStore {
    steps: RwLock<HashMap<(ExecutionId, String), serde_json::Value>>,
}

impl InMemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StepStore for InMemoryStepStore {
    async fn load(&self, execution_id: &ExecutionId, step: &str) -> Result<Option<serde_json::Value>> {
        let key = (execution_id.clone(), step.to_string());
        Ok(self.steps.read().await.get(&key).cloned())
    }

    async fn save(&self, execution_id: &ExecutionId, step: &str, output: &serde_json::Value) -> Result<()> {
        self.steps
            .write()
            .await
            .insert((execution_id.clone(), step.to_string()), output.clone());
        Ok(())
    }

    async fn completed_steps(&self, execution_id: &ExecutionId) -> Result<Vec<String>> {
        let mut steps: Vec<String> = self
            .steps
            .read()
            .await
            .keys()
            .filter(|(exec, _)| exec == execution_id)
            .map(|(_, step)| step.clone())
            .collect();
        steps.sort();
        Ok(steps)
    }
}

/// Durable step store using redb
#[derive(Clone)]
pub struct RedbStepStore {
    db: Arc<Database>,
}

impl RedbStepStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create step store directory")?;
        }

        let db = Database::create(&path).context("Failed to create redb database")?;

        // Initialize tables
        let write_txn = db.begin_write().context("Failed to begin write transaction")?;
        {
            let _steps_table = write_txn
                .open_table(STEPS_TABLE)
                .context("Failed to open steps table")?;
        }
        write_txn.commit().context("Failed to commit transaction")?;

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait::async_trait]
impl StepStore for RedbStepStore {
    async fn load(&self, execution_id: &ExecutionId, step: &str) -> Result<Option<serde_json::Value>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn.open_table(STEPS_TABLE).context("Failed to open table")?;

        let value = table
            .get((execution_id.as_str(), step))
            .context("Failed to get step")?;

        match value {
            Some(guard) => {
                let output = serde_json::from_slice(guard.value())
                    .context("Failed to deserialize step output")?;
                Ok(Some(output))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, execution_id: &ExecutionId, step: &str, output: &serde_json::Value) -> Result<()> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let mut table = write_txn
                .open_table(STEPS_TABLE)
                .context("Failed to open table")?;

            let value = serde_json::to_vec(output).context("Failed to serialize step output")?;

            table
                .insert((execution_id.as_str(), step), value.as_slice())
                .context("Failed to insert step")?;
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    async fn completed_steps(&self, execution_id: &ExecutionId) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn.open_table(STEPS_TABLE).context("Failed to open table")?;

        let mut steps = Vec::new();
        let range = table
            .range((execution_id.as_str(), "")..)
            .context("Failed to scan steps")?;
        for item in range {
            let (key, _value) = item.context("Failed to read item")?;
            let (exec, step) = key.value();
            if exec != execution_id.as_str() {
                break;
            }
            steps.push(step.to_string());
        }

        Ok(steps)
    }
}
