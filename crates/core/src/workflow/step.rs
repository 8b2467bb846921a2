use crate::error::{WorkflowError, WorkflowResult};
use crate::storage::StepStore;
use crate::types::ExecutionId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Bounded retry for infrastructure faults inside a step
#[derive(Debug, Clone)]
pub struct StepRetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for StepRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl StepRetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (exponential backoff)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Durable execution context for one run
///
/// Completed steps are memoized in the [`StepStore`] under the execution id,
/// so a re-run replays them instead of invoking them again.
#[derive(Clone)]
pub struct StepContext {
    execution_id: ExecutionId,
    store: Arc<dyn StepStore>,
    policy: StepRetryPolicy,
}

impl StepContext {
    pub fn new(execution_id: ExecutionId, store: Arc<dyn StepStore>, policy: StepRetryPolicy) -> Self {
        Self {
            execution_id,
            store,
            policy,
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Run `f` as the step `name`, or replay its persisted result
    ///
    /// Only retriable errors are retried, up to the policy's attempt limit.
    /// Errors are never persisted.
    pub async fn run<T, F, Fut>(&self, name: &str, mut f: F) -> WorkflowResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = WorkflowResult<T>>,
    {
        let mut attempt = 1;

        loop {
            match self.attempt(name, &mut f).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retriable() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        "Step {} failed (attempt {}), retrying after {:?}: {}",
                        name,
                        attempt,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retriable() {
                        tracing::error!("Step {} gave up after {} attempts: {}", name, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn attempt<T, F, Fut>(&self, name: &str, f: &mut F) -> WorkflowResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = WorkflowResult<T>>,
    {
        let step_error = |source: anyhow::Error| WorkflowError::Step {
            step: name.to_string(),
            source,
        };

        let memoized = self
            .store
            .load(&self.execution_id, name)
            .await
            .map_err(step_error)?;

        if let Some(value) = memoized {
            tracing::debug!("Replaying memoized step {} for {}", name, self.execution_id);
            // A memo that no longer decodes stays broken on every attempt
            return serde_json::from_value(value).map_err(|e| {
                WorkflowError::Storage(
                    anyhow::Error::new(e).context(format!("Memoized step {} is unreadable", name)),
                )
            });
        }

        let output = f().await?;

        let value = serde_json::to_value(&output).map_err(|e| step_error(e.into()))?;
        self.store
            .save(&self.execution_id, name, &value)
            .await
            .map_err(step_error)?;

        Ok(output)
    }
}
