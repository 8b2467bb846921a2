use anyhow::{Context, Result};
use nodeflow_core::executors::{ExecutorRegistry, HttpSettings};
use nodeflow_core::storage::{JsonWorkflowStore, RedbStepStore};
use nodeflow_core::workflow::{ExecutionIdFallback, RunnerOptions, StepRetryPolicy, WorkflowRunner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub execution_id_fallback: ExecutionIdFallback,

    /// Variables handed to every executor
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,

    #[serde(default = "default_step_store_file")]
    pub step_store_file: String,
}

fn default_workflows_dir() -> String {
    "workflows".to_string()
}

fn default_step_store_file() -> String {
    "steps.redb".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workflows_dir: default_workflows_dir(),
            step_store_file: default_step_store_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> StepRetryPolicy {
        StepRetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

impl WorkerConfig {
    /// Read `config_path` when present, falling back to defaults, and root all paths at `data_dir`
    pub fn load(config_path: &Path, data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let parsed = match std::fs::read_to_string(config_path) {
            Ok(content) => toml::from_str::<Self>(&content).with_context(|| {
                format!("Failed to parse configuration file {}", config_path.display())
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No configuration at {}, using defaults",
                    config_path.display()
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read configuration file {}", config_path.display())
                })
            }
        };

        Ok(Self { data_dir, ..parsed })
    }

    /// Get the workflow graph directory
    pub fn workflows_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.workflows_dir)
    }

    /// Get the step store path
    pub fn step_store_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.step_store_file)
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            retry: self.retry.policy(),
            execution_id_fallback: self.execution_id_fallback,
            environment: self.environment.clone(),
        }
    }

    /// Wire the stores, executors and runner described by this config
    pub fn build_runner(&self) -> Result<WorkflowRunner> {
        let workflows = Arc::new(
            JsonWorkflowStore::new(self.workflows_path())
                .context("Failed to create workflow store")?,
        );

        let step_store = Arc::new(
            RedbStepStore::new(self.step_store_path()).context("Failed to create step store")?,
        );

        let registry = Arc::new(
            ExecutorRegistry::with_defaults(self.http.settings())
                .context("Failed to build executor registry")?,
        );

        Ok(WorkflowRunner::new(
            workflows,
            registry,
            step_store,
            self.runner_options(),
        ))
    }
}
