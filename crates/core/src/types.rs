use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;

/// Output data threaded from one node to the next
pub type OutputData = serde_json::Map<String, serde_json::Value>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a workflow
    WorkflowId
);
string_id!(
    /// Unique identifier for a node within a workflow
    NodeId
);
string_id!(
    /// Unique identifier for a connection
    ConnectionId
);
string_id!(
    /// Unique identifier for a single run of a workflow
    ExecutionId
);

impl ExecutionId {
    /// Fresh random execution id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Kind of node; selects the executor that runs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Placeholder shown in an empty editor; never executable
    Initial,
    ManualTrigger,
    HttpRequest,
}

impl NodeType {
    pub const ALL: [NodeType; 3] = [
        NodeType::Initial,
        NodeType::ManualTrigger,
        NodeType::HttpRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Initial => "INITIAL",
            NodeType::ManualTrigger => "MANUAL_TRIGGER",
            NodeType::HttpRequest => "HTTP_REQUEST",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Type-specific configuration
    #[serde(default)]
    pub data: OutputData,
}

impl Node {
    pub fn new(id: impl Into<String>, workflow_id: &WorkflowId, node_type: NodeType) -> Self {
        Self {
            id: NodeId::new(id),
            workflow_id: workflow_id.clone(),
            node_type,
            data: OutputData::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = data {
            self.data = map;
        }
        self
    }
}

fn default_handle() -> String {
    "main".to_string()
}

/// Directed edge from an output handle of one node to an input handle of another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub workflow_id: WorkflowId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    #[serde(default = "default_handle")]
    pub from_output: String,
    #[serde(default = "default_handle")]
    pub to_input: String,
}

impl Connection {
    pub fn new(workflow_id: &WorkflowId, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: ConnectionId::new(format!("{}->{}", from, to)),
            workflow_id: workflow_id.clone(),
            from_node_id: NodeId::new(from),
            to_node_id: NodeId::new(to),
            from_output: default_handle(),
            to_input: default_handle(),
        }
    }

    /// Handle names are restricted to ASCII letters, digits and underscore
    pub fn validate_handles(&self) -> Result<(), WorkflowError> {
        for handle in [&self.from_output, &self.to_input] {
            if !is_valid_handle(handle) {
                return Err(WorkflowError::InvalidHandle {
                    connection_id: self.id.clone(),
                    handle: handle.clone(),
                });
            }
        }
        Ok(())
    }
}

fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A workflow together with its nodes and connections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub id: WorkflowId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl WorkflowGraph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(id),
            name: None,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn node(mut self, id: &str, node_type: NodeType) -> Self {
        let node = Node::new(id, &self.id, node_type);
        self.nodes.push(node);
        self
    }

    pub fn connect(mut self, from: &str, to: &str) -> Self {
        let connection = Connection::new(&self.id, from, to);
        self.connections.push(connection);
        self
    }
}

/// Status of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }
}

/// How an execution was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Manual,
    Triggered,
}

/// One run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    pub output: OutputData,
    pub nodes_executed: Option<usize>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(id: ExecutionId, workflow_id: WorkflowId, mode: ExecutionMode) -> Self {
        Self {
            id,
            workflow_id,
            status: ExecutionStatus::Pending,
            mode,
            output: OutputData::new(),
            nodes_executed: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) -> Result<(), WorkflowError> {
        self.transition(ExecutionStatus::Pending, ExecutionStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, summary: &RunSummary) -> Result<(), WorkflowError> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Succeeded)?;
        self.nodes_executed = Some(summary.nodes_executed);
        self.output = summary.output.clone();
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Failed runs never report a partial node count
    pub fn fail(&mut self, error: &WorkflowError) -> Result<(), WorkflowError> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Failed)?;
        self.nodes_executed = None;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(
        &mut self,
        expected: ExecutionStatus,
        next: ExecutionStatus,
    ) -> Result<(), WorkflowError> {
        if self.status != expected {
            return Err(WorkflowError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Per-node outcome reported by an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<OutputData>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(data: OutputData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a fully successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub success: bool,
    pub execution_id: ExecutionId,
    pub nodes_executed: usize,
    /// Output of the final node
    #[serde(default)]
    pub output: OutputData,
}
