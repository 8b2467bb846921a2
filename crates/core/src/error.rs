//! Error taxonomy for workflow execution.

use crate::types::{ConnectionId, ExecutionStatus, NodeId, NodeType, WorkflowId};

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors that terminate (or, for transient faults, interrupt) a workflow run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The triggering event carried no workflow id.
    #[error("workflowId is missing")]
    MissingWorkflowId,

    /// The persistence collaborator has no such workflow.
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// A connection points at a node outside the workflow's node set.
    #[error("connection {connection_id} references unknown node {node_id}")]
    DanglingReference {
        connection_id: ConnectionId,
        node_id: NodeId,
    },

    /// A connection handle uses characters outside `[A-Za-z0-9_]`.
    #[error("connection {connection_id} has invalid handle {handle:?}")]
    InvalidHandle {
        connection_id: ConnectionId,
        handle: String,
    },

    #[error("workflow contains a cycle through node {node}")]
    CyclicWorkflow { node: NodeId },

    #[error("no executor registered for node type {0}")]
    UnknownNodeType(NodeType),

    /// An executor reported `success: false`.
    #[error("Node {node_id} execution failed: {message}")]
    NodeExecutionFailed { node_id: NodeId, message: String },

    #[error("invalid execution transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// The step store could not read or write a memoized result.
    #[error("step {step} storage error: {source}")]
    Step {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// Stored data that cannot be used as-is; retrying will not help.
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// Infrastructure fault that the step host may retry.
    #[error("transient failure: {0}")]
    Transient(#[source] anyhow::Error),
}

impl WorkflowError {
    /// Whether the step host may re-run the step that produced this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, WorkflowError::Transient(_) | WorkflowError::Step { .. })
    }

    /// Node that caused the failure, when there is one
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            WorkflowError::NodeExecutionFailed { node_id, .. } => Some(node_id),
            WorkflowError::DanglingReference { node_id, .. } => Some(node_id),
            WorkflowError::CyclicWorkflow { node } => Some(node),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_infrastructure_faults_are_retriable() {
        assert!(WorkflowError::Transient(anyhow::anyhow!("connection reset")).is_retriable());
        assert!(WorkflowError::Step {
            step: "prepare-workflow".to_string(),
            source: anyhow::anyhow!("disk full"),
        }
        .is_retriable());

        assert!(!WorkflowError::MissingWorkflowId.is_retriable());
        assert!(!WorkflowError::CyclicWorkflow {
            node: NodeId::new("a")
        }
        .is_retriable());
        assert!(!WorkflowError::UnknownNodeType(NodeType::HttpRequest).is_retriable());
        assert!(!WorkflowError::NodeExecutionFailed {
            node_id: NodeId::new("b"),
            message: "boom".to_string(),
        }
        .is_retriable());
    }

    #[test]
    fn test_node_failure_names_node() {
        let err = WorkflowError::NodeExecutionFailed {
            node_id: NodeId::new("B"),
            message: "HTTP 500".to_string(),
        };
        assert_eq!(err.to_string(), "Node B execution failed: HTTP 500");
        assert_eq!(err.node_id(), Some(&NodeId::new("B")));
    }
}
