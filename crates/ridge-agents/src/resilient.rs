use std::sync::Arc;
use std::time::Duration;

use ridge_models::DeliberationConfig;
use tracing::{debug, warn};

use crate::backend::{Completion, CompletionRequest, ReasoningBackend};
use crate::error::AgentError;

/// Per-call timeout and retry bound applied to every backend call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    pub max_retries: u32,
    /// Attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliberationConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Longest one role can take before the wrapper gives up on it.
    pub fn role_budget(&self) -> Duration {
        let backoff_steps: u32 = (1..=self.max_retries).sum();
        self.call_timeout * self.attempts() + self.backoff * backoff_steps
    }
}

/// A parsed backend response and how many attempts it took.
#[derive(Debug)]
pub struct Attempt<T> {
    pub value: T,
    pub completion: Completion,
    pub attempts: u32,
}

/// Every attempt failed; `reason` is ready to go on a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted {
    pub reason: String,
    pub attempts: u32,
}

/// Wraps the single `complete()` boundary with timeout, retry and parse validation.
///
/// Empty text and unparseable text count as failures. The caller turns
/// [`Exhausted`] into a placeholder; nothing here returns an error upward.
#[derive(Clone)]
pub struct ResilientBackend {
    inner: Arc<dyn ReasoningBackend>,
    policy: RetryPolicy,
}

impl ResilientBackend {
    pub fn new(inner: Arc<dyn ReasoningBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn call<T, F>(
        &self,
        request: &CompletionRequest,
        parse: F,
    ) -> Result<Attempt<T>, Exhausted>
    where
        F: Fn(&Completion) -> Result<T, AgentError>,
    {
        let attempts = self.policy.attempts();
        let mut last_error = AgentError::EmptyResponse;

        for attempt in 1..=attempts {
            match self.attempt(request, &parse).await {
                Ok((value, completion)) => {
                    debug!(
                        role = %request.role,
                        backend = self.inner.name(),
                        attempt,
                        "Backend call succeeded"
                    );
                    return Ok(Attempt {
                        value,
                        completion,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(
                        role = %request.role,
                        backend = self.inner.name(),
                        attempt,
                        error = %e,
                        "Backend call failed"
                    );
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        Err(Exhausted {
            reason: format!("{last_error} (after {attempts} attempts)"),
            attempts,
        })
    }

    async fn attempt<T, F>(
        &self,
        request: &CompletionRequest,
        parse: &F,
    ) -> Result<(T, Completion), AgentError>
    where
        F: Fn(&Completion) -> Result<T, AgentError>,
    {
        let completion =
            tokio::time::timeout(self.policy.call_timeout, self.inner.complete(request))
                .await
                .map_err(|_| AgentError::Timeout(self.policy.call_timeout.as_millis() as u64))??;
        if completion.text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        let value = parse(&completion)?;
        Ok((value, completion))
    }
}
