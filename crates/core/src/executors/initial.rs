use super::{ExecutionContext, Executor};
use crate::types::{ExecutionResult, NodeType};
use anyhow::Result;

/// Editor placeholder; reaching execution means the workflow was never built out
pub struct InitialNodeExecutor;

#[async_trait::async_trait]
impl Executor for InitialNodeExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Initial
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionResult> {
        tracing::warn!(
            "Placeholder node {} reached execution in workflow {}",
            context.node_id,
            context.workflow_id
        );
        Ok(ExecutionResult::failure(
            "placeholder node must be replaced before execution",
        ))
    }
}
