// ============================================================================
// Resilience Pipeline
// ============================================================================
//
// Layered fault tolerance around a single fallible operation:
//
//   concurrency limiter -> retry -> per-attempt timeout -> circuit breaker
//
// - full:         all layers, for local resources (PostgreSQL, Redis)
// - publish_only: retry + timeout, for outbound bus publishing
//
// The limiter holds one permit for the whole execution, retries included,
// and rejects immediately when exhausted. Circuit-open is never retried.
//
// ============================================================================

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State};
pub use retry::RetryPolicy;

use identity_config::ResilienceConfig;
use identity_error::AppError;
use identity_metrics::RESILIENCE_REJECTIONS_TOTAL;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Errors the pipeline may retry
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

impl TransientError for AppError {
    fn is_transient(&self) -> bool {
        AppError::is_transient(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    /// Concurrency cap reached
    #[error("Rejected: concurrency limit reached")]
    Rejected,

    #[error("Circuit open, retry in {remaining:?}")]
    CircuitOpen { remaining: Duration },

    #[error("Timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("{0}")]
    Inner(E),
}

impl<E: TransientError> ResilienceError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            ResilienceError::Timeout { .. } => true,
            ResilienceError::Inner(e) => e.is_transient(),
            ResilienceError::Rejected | ResilienceError::CircuitOpen { .. } => false,
        }
    }
}

impl<E> From<CircuitBreakerError<E>> for ResilienceError<E> {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::Open { remaining } => ResilienceError::CircuitOpen { remaining },
            CircuitBreakerError::Timeout { timeout } => ResilienceError::Timeout { timeout },
            CircuitBreakerError::Inner(e) => ResilienceError::Inner(e),
        }
    }
}

impl From<ResilienceError<AppError>> for AppError {
    fn from(err: ResilienceError<AppError>) -> Self {
        match err {
            ResilienceError::Rejected => {
                AppError::unavailable("Resilience pipeline concurrency limit reached")
            }
            ResilienceError::CircuitOpen { remaining } => {
                AppError::unavailable(format!("Circuit breaker open, retry in {:?}", remaining))
            }
            ResilienceError::Timeout { timeout } => AppError::Timeout(timeout),
            ResilienceError::Inner(e) => e,
        }
    }
}

pub struct ResiliencePipeline {
    name: String,
    timeout: Duration,
    retry: RetryPolicy,
    limiter: Option<Semaphore>,
    breaker: Option<CircuitBreaker>,
}

impl ResiliencePipeline {
    /// Limiter, retry, timeout and circuit breaker
    pub fn full(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        let name = name.into();
        Self {
            timeout: config.timeout,
            retry: RetryPolicy::new(config.retry_count, config.retry_base_delay),
            limiter: Some(Semaphore::new(config.max_concurrency.max(1))),
            breaker: Some(CircuitBreaker::new(
                name.clone(),
                CircuitBreakerConfig::from(config),
            )),
            name,
        }
    }

    /// Retry and timeout only
    pub fn publish_only(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self {
            name: name.into(),
            timeout: config.timeout,
            retry: RetryPolicy::new(config.retry_count, config.retry_base_delay),
            limiter: None,
            breaker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Run `operation`, re-invoking it for each attempt
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: TransientError + std::fmt::Display,
    {
        let _permit = match &self.limiter {
            Some(limiter) => match limiter.try_acquire() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.count_rejection("rejected");
                    warn!(pipeline = %self.name, "Concurrency limit reached, rejecting call");
                    return Err(ResilienceError::Rejected);
                }
            },
            None => None,
        };

        let mut retries = 0;
        loop {
            let err = match self.attempt(operation()).await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(pipeline = %self.name, retries = retries, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if let ResilienceError::CircuitOpen { .. } = err {
                self.count_rejection("circuit_open");
            }

            if !err.is_retryable() || retries >= self.retry.max_retries {
                return Err(err);
            }

            retries += 1;
            let delay = self.retry.delay(retries);
            warn!(
                pipeline = %self.name,
                attempt = retries,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, will retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<Fut, T, E>(&self, operation: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: TransientError,
    {
        match &self.breaker {
            Some(breaker) => breaker
                .call(self.timeout, operation)
                .await
                .map_err(ResilienceError::from),
            None => match tokio::time::timeout(self.timeout, operation).await {
                Ok(result) => result.map_err(ResilienceError::Inner),
                Err(_) => Err(ResilienceError::Timeout {
                    timeout: self.timeout,
                }),
            },
        }
    }

    fn count_rejection(&self, reason: &str) {
        RESILIENCE_REJECTIONS_TOTAL
            .with_label_values(&[self.name.as_str(), reason])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> ResilienceConfig {
        ResilienceConfig {
            timeout: Duration::from_millis(100),
            retry_count: 2,
            retry_base_delay: Duration::from_millis(1),
            max_concurrency: 1,
            ..ResilienceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let pipeline = ResiliencePipeline::full("test-retry", &fast_config());
        let calls = AtomicU32::new(0);

        let result = pipeline
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::invalid_state("not yet"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_propagates_last_error() {
        let pipeline = ResiliencePipeline::publish_only("test-exhaust", &fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::invalid_state("still broken"))
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Inner(AppError::InvalidState(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let pipeline = ResiliencePipeline::full("test-no-retry", &fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::validation("bad input"))
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Inner(AppError::Validation(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_surfaces() {
        let pipeline = ResiliencePipeline::publish_only("test-timeout", &fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<(), ResilienceError<AppError>> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrency_limit_rejects_immediately() {
        let pipeline = Arc::new(ResiliencePipeline::full("test-limit", &fast_config()));
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let mut started_tx = Some(started_tx);
                let mut release_rx = Some(release_rx);
                pipeline
                    .execute(|| {
                        let started = started_tx.take();
                        let release = release_rx.take();
                        async move {
                            if let Some(tx) = started {
                                let _ = tx.send(());
                            }
                            if let Some(rx) = release {
                                let _ = rx.await;
                            }
                            Ok::<_, AppError>(())
                        }
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        let result = pipeline.execute(|| async { Ok::<_, AppError>(()) }).await;
        assert!(matches!(result, Err(ResilienceError::Rejected)));

        release_tx.send(()).unwrap();
        assert!(holder.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_open_circuit_is_not_retried() {
        let pipeline = ResiliencePipeline::full("test-open-circuit", &fast_config());
        pipeline.circuit_breaker().unwrap().force_open().await;
        let calls = AtomicU32::new(0);

        let result = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = ResilienceError::<AppError>::Rejected.into();
        assert!(matches!(err, AppError::Unavailable(_)));

        let err: AppError = ResilienceError::<AppError>::Timeout {
            timeout: Duration::from_secs(10),
        }
        .into();
        assert!(matches!(err, AppError::Timeout(_)));

        let err: AppError =
            ResilienceError::Inner(AppError::not_found("user", "id", "u1")).into();
        assert!(err.is_not_found());
    }
}
