// DAG-based workflow execution engine

pub mod dag;
pub mod runner;
pub mod step;

pub use dag::{topological_sort, ExecutionOrder, WorkflowDag};
pub use runner::{ExecutionIdFallback, RunnerOptions, WorkflowRunner};
pub use step::{StepContext, StepRetryPolicy};
