use super::{ExecutionContext, Executor};
use crate::types::{ExecutionResult, NodeType};
use anyhow::Result;

/// Starts a run by hand; hands its input through untouched
pub struct ManualTriggerExecutor;

#[async_trait::async_trait]
impl Executor for ManualTriggerExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::ManualTrigger
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionResult> {
        tracing::debug!(
            "Manual trigger {} fired for execution {}",
            context.node_id,
            context.execution_id
        );
        Ok(ExecutionResult::success(context.previous_data.clone()))
    }
}
