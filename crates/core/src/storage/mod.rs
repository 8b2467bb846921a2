pub mod step_store;
pub mod workflow_store;

pub use step_store::{InMemoryStepStore, RedbStepStore, StepStore};
pub use workflow_store::{InMemoryWorkflowStore, JsonWorkflowStore, WorkflowLoader};
