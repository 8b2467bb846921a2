// Core engine for running node-based workflow graphs

pub mod error;
pub mod event;
pub mod executors;
pub mod storage;
pub mod types;
pub mod workflow;

pub use error::{WorkflowError, WorkflowResult};
pub use types::*;
