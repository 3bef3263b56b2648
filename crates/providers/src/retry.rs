//! Exponential backoff around outbound calls.
//!
//! The wait before retry `n` is `multiplier * 2^(n-1)`, clamped to
//! `[min_wait, max_wait]`. Only errors whose `is_retryable()` is true are
//! retried; anything else is returned immediately.

use async_trait::async_trait;
use simap_config::RetryConfig;
use simap_core::error::ProviderError;
use simap_core::provider::*;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    /// `max_attempts` tries with no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// How long to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        let raw = self.multiplier.saturating_mul(exp);
        raw.clamp(self.min_wait, self.max_wait)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            multiplier: Duration::from_millis(config.multiplier_ms),
            min_wait: Duration::from_millis(config.min_wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted. The last error is returned.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "Retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let wait = policy.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                if is_retryable(&e) {
                    warn!(operation = label, attempts = attempt, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// A provider that retries the wrapped provider's completions and
/// embeddings according to a [`RetryPolicy`].
pub struct RetryProvider {
    inner: Arc<dyn simap_core::Provider>,
    policy: RetryPolicy,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn simap_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl simap_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        with_retry(&self.policy, "llm.complete", ProviderError::is_retryable, || {
            self.inner.complete(request.clone())
        })
        .await
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        with_retry(&self.policy, "llm.embed", ProviderError::is_retryable, || {
            self.inner.embed(request.clone())
        })
        .await
    }
}
