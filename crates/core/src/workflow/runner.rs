use super::dag::topological_sort;
use super::step::{StepContext, StepRetryPolicy};
use crate::error::{WorkflowError, WorkflowResult};
use crate::event::ExecuteWorkflowEvent;
use crate::executors::{ExecutionContext, ExecutorRegistry};
use crate::storage::{StepStore, WorkflowLoader};
use crate::types::{
    Execution, ExecutionId, ExecutionMode, ExecutionResult, Node, OutputData, RunSummary,
    WorkflowId,
};
use futures::{stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Step name for loading and ordering the graph
pub const PREPARE_STEP: &str = "prepare-workflow";

/// Step name for one node's execution
pub fn node_step_name(node: &Node) -> String {
    format!("execute-node-{}", node.id)
}

/// What to use as the execution id when the event carries none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionIdFallback {
    /// Fresh UUID per run
    #[default]
    Generate,
    /// Reuse the workflow id; every run of the workflow then shares step memos
    WorkflowId,
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub retry: StepRetryPolicy,
    pub execution_id_fallback: ExecutionIdFallback,
    /// Passed to every executor
    pub environment: HashMap<String, String>,
}

/// Runs workflow graphs node by node inside a durable step context
pub struct WorkflowRunner {
    loader: Arc<dyn WorkflowLoader>,
    registry: Arc<ExecutorRegistry>,
    step_store: Arc<dyn StepStore>,
    options: RunnerOptions,
}

impl WorkflowRunner {
    pub fn new(
        loader: Arc<dyn WorkflowLoader>,
        registry: Arc<ExecutorRegistry>,
        step_store: Arc<dyn StepStore>,
        options: RunnerOptions,
    ) -> Self {
        let missing = registry.missing_types();
        if !missing.is_empty() {
            tracing::warn!("No executor registered for node types {:?}", missing);
        }

        Self {
            loader,
            registry,
            step_store,
            options,
        }
    }

    /// Handle a `workflows/execute.workflow` event
    pub async fn execute(&self, event: &ExecuteWorkflowEvent) -> WorkflowResult<RunSummary> {
        let (workflow_id, execution_id) = self.resolve_ids(event)?;
        let initial = event.data.initial_data.clone().unwrap_or_default();
        self.run(&workflow_id, execution_id, initial).await
    }

    /// Like [`execute`](Self::execute), but reports through an [`Execution`] record
    ///
    /// Only a missing workflow id is returned as an error, since no record can
    /// exist without one.
    pub async fn execute_tracked(
        &self,
        event: &ExecuteWorkflowEvent,
        mode: ExecutionMode,
    ) -> WorkflowResult<Execution> {
        let (workflow_id, execution_id) = self.resolve_ids(event)?;
        let initial = event.data.initial_data.clone().unwrap_or_default();

        let mut execution = Execution::new(execution_id.clone(), workflow_id.clone(), mode);
        execution.start()?;

        match self.run(&workflow_id, execution_id, initial).await {
            Ok(summary) => execution.succeed(&summary)?,
            Err(e) => execution.fail(&e)?,
        }

        Ok(execution)
    }

    /// Load and order a workflow without running it
    pub async fn plan(&self, workflow_id: &WorkflowId) -> WorkflowResult<Vec<Node>> {
        self.prepare(workflow_id).await
    }

    fn resolve_ids(&self, event: &ExecuteWorkflowEvent) -> WorkflowResult<(WorkflowId, ExecutionId)> {
        let workflow_id = event.workflow_id()?.clone();

        let execution_id = match &event.data.execution_id {
            Some(id) if !id.as_str().is_empty() => id.clone(),
            _ => match self.options.execution_id_fallback {
                ExecutionIdFallback::Generate => ExecutionId::generate(),
                ExecutionIdFallback::WorkflowId => {
                    tracing::warn!(
                        "No executionId for workflow {}, reusing the workflow id",
                        workflow_id
                    );
                    ExecutionId::new(workflow_id.as_str())
                }
            },
        };

        Ok((workflow_id, execution_id))
    }

    async fn run(
        &self,
        workflow_id: &WorkflowId,
        execution_id: ExecutionId,
        initial: OutputData,
    ) -> WorkflowResult<RunSummary> {
        tracing::info!(
            "Starting workflow execution: workflow_id={}, execution_id={}",
            workflow_id,
            execution_id
        );

        let steps = StepContext::new(
            execution_id.clone(),
            self.step_store.clone(),
            self.options.retry.clone(),
        );

        let nodes: Vec<Node> = steps
            .run(PREPARE_STEP, || self.prepare(workflow_id))
            .await
            .inspect_err(|e| tracing::error!("Failed to prepare workflow {}: {}", workflow_id, e))?;

        // Each node's output becomes the next node's input
        let output = stream::iter(nodes.iter().map(Ok::<_, WorkflowError>))
            .try_fold(initial, |previous, node| {
                let steps = &steps;
                async move { self.execute_node(steps, workflow_id, node, previous).await }
            })
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "Workflow execution failed: execution_id={}, error={}",
                    execution_id,
                    e
                )
            })?;

        tracing::info!(
            "Workflow execution completed: execution_id={}, nodes={}",
            execution_id,
            nodes.len()
        );

        Ok(RunSummary {
            success: true,
            execution_id,
            nodes_executed: nodes.len(),
            output,
        })
    }

    async fn prepare(&self, workflow_id: &WorkflowId) -> WorkflowResult<Vec<Node>> {
        let workflow = self.loader.load_workflow_with_graph(workflow_id).await?;
        let order = topological_sort(&workflow.nodes, &workflow.connections)?;

        tracing::debug!(
            "Workflow {} ordered as {:?}",
            workflow_id,
            order.node_ids()
        );

        Ok(order.to_owned_nodes())
    }

    async fn execute_node(
        &self,
        steps: &StepContext,
        workflow_id: &WorkflowId,
        node: &Node,
        previous: OutputData,
    ) -> WorkflowResult<OutputData> {
        let context = ExecutionContext {
            workflow_id: workflow_id.clone(),
            execution_id: steps.execution_id().clone(),
            node_id: node.id.clone(),
            node_data: node.data.clone(),
            previous_data: previous,
            environment: self.options.environment.clone(),
        };

        tracing::info!("Executing node {} ({})", node.id, node.node_type);

        let result: ExecutionResult = steps
            .run(&node_step_name(node), || self.invoke(node, &context))
            .await?;

        if !result.success {
            return Err(WorkflowError::NodeExecutionFailed {
                node_id: node.id.clone(),
                message: result.error.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        Ok(result.data.unwrap_or_default())
    }

    async fn invoke(&self, node: &Node, context: &ExecutionContext) -> WorkflowResult<ExecutionResult> {
        let executor = self.registry.get_executor(node.node_type)?;
        executor
            .execute(context)
            .await
            .map_err(WorkflowError::Transient)
    }
}
