use crate::error::{WorkflowError, WorkflowResult};
use crate::types::{ExecutionId, OutputData, WorkflowId};
use serde::{Deserialize, Serialize};

/// Event name that triggers a workflow run
pub const EXECUTE_WORKFLOW_EVENT: &str = "workflows/execute.workflow";

/// Event delivered by the event bus to start a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteWorkflowEvent {
    #[serde(default = "default_event_name")]
    pub name: String,
    #[serde(default)]
    pub data: ExecuteWorkflowData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowData {
    #[serde(default)]
    pub workflow_id: Option<WorkflowId>,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    #[serde(default)]
    pub initial_data: Option<OutputData>,
}

fn default_event_name() -> String {
    EXECUTE_WORKFLOW_EVENT.to_string()
}

impl ExecuteWorkflowEvent {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            name: default_event_name(),
            data: ExecuteWorkflowData {
                workflow_id: Some(WorkflowId::new(workflow_id)),
                execution_id: None,
                initial_data: None,
            },
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.data.execution_id = Some(ExecutionId::new(execution_id));
        self
    }

    pub fn with_initial_data(mut self, data: OutputData) -> Self {
        self.data.initial_data = Some(data);
        self
    }

    /// Workflow id, treating an empty string the same as an absent one
    pub fn workflow_id(&self) -> WorkflowResult<&WorkflowId> {
        match &self.data.workflow_id {
            Some(id) if !id.as_str().is_empty() => Ok(id),
            _ => Err(WorkflowError::MissingWorkflowId),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_event_payload() {
        let event: ExecuteWorkflowEvent = serde_json::from_value(json!({
            "name": "workflows/execute.workflow",
            "data": {
                "workflowId": "wf-1",
                "executionId": "exec-9",
                "initialData": { "user": "ada" }
            }
        }))
        .unwrap();

        assert_eq!(event.workflow_id().unwrap().as_str(), "wf-1");
        assert_eq!(event.data.execution_id, Some(ExecutionId::new("exec-9")));
        assert_eq!(event.data.initial_data.unwrap()["user"], "ada");
    }

    #[test]
    fn test_missing_or_empty_workflow_id() {
        let event: ExecuteWorkflowEvent = serde_json::from_value(json!({ "data": {} })).unwrap();
        assert_eq!(event.name, EXECUTE_WORKFLOW_EVENT);
        assert!(matches!(
            event.workflow_id(),
            Err(WorkflowError::MissingWorkflowId)
        ));

        let event = ExecuteWorkflowEvent::new("");
        assert!(matches!(
            event.workflow_id(),
            Err(WorkflowError::MissingWorkflowId)
        ));
    }
}
