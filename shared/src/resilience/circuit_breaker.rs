// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Fails fast while a dependency (database, Redis) is known to be down.
//
// States:
// - CLOSED: calls go through, outcomes are sampled in a sliding window
// - OPEN: calls are rejected until open_duration elapses
// - HALF_OPEN: a single trial call decides between CLOSED and OPEN
//
// The circuit opens once the window holds at least failure_threshold
// samples and the failure ratio among them reaches failure_ratio.
//
// Only transient failures and timeouts count against the circuit. A
// domain answer such as "not found" means the dependency responded.
//
// ============================================================================

use super::TransientError;
use identity_config::ResilienceConfig;
use identity_metrics::CIRCUIT_BREAKER_STATE;
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Circuit Breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Minimum samples in the window before the circuit may open
    pub failure_threshold: u32,
    /// How far back outcomes are remembered
    pub sampling_window: Duration,
    /// Failure ratio (0.0 - 1.0) at which the circuit opens
    pub failure_ratio: f64,
    /// Time to wait before attempting recovery (half-open)
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold,
            sampling_window: config.circuit_breaker_sampling_window,
            failure_ratio: config.circuit_breaker_failure_ratio,
            open_duration: config.circuit_breaker_open_duration,
        }
    }
}

/// Circuit Breaker error types
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, request rejected without running the operation
    #[error("Circuit breaker is OPEN - retry in {remaining:?}")]
    Open { remaining: Duration },

    /// Operation timed out
    #[error("Circuit breaker timeout ({timeout:?}) exceeded")]
    Timeout { timeout: Duration },

    /// Underlying operation failed
    #[error("Operation failed: {0}")]
    Inner(#[source] E),
}

/// Circuit Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Normal operation
    Closed,
    /// Too many failures, rejecting requests
    Open,
    /// Testing if service recovered
    HalfOpen,
}

impl State {
    fn gauge_value(self) -> i64 {
        match self {
            State::Closed => 0,
            State::Open => 1,
            State::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

struct Inner {
    state: State,
    /// (recorded at, failed)
    samples: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Sliding-window circuit breaker shared by every call of one pipeline
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let breaker = Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                samples: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        };
        breaker.publish_state(State::Closed);
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// `timeout` bounds the operation; an elapsed timeout counts as a failure.
    pub async fn call<F, T, E>(
        &self,
        timeout: Duration,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
        E: TransientError,
    {
        let admission = self.admit().await?;

        match tokio::time::timeout(timeout, operation).await {
            Err(_elapsed) => {
                self.record(admission, true).await;
                tracing::warn!(
                    breaker = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Circuit breaker call timed out"
                );
                Err(CircuitBreakerError::Timeout { timeout })
            }
            Ok(Ok(value)) => {
                self.record(admission, false).await;
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record(admission, error.is_transient()).await;
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    /// Current state; an open circuit whose open_duration has elapsed reports HalfOpen
    pub async fn state(&self) -> State {
        let inner = self.inner.lock().await;
        match (inner.state, inner.opened_at) {
            (State::Open, Some(opened_at)) if opened_at.elapsed() >= self.config.open_duration => {
                State::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Manually open the circuit (e.g. during maintenance)
    pub async fn force_open(&self) {
        let mut inner = self.inner.lock().await;
        self.open(&mut inner);
        tracing::warn!(breaker = %self.name, "Circuit breaker manually opened");
    }

    /// Manually close the circuit and forget sampled outcomes
    pub async fn force_close(&self) {
        let mut inner = self.inner.lock().await;
        self.close(&mut inner);
        tracing::info!(breaker = %self.name, "Circuit breaker manually closed");
    }

    async fn admit<E>(&self) -> Result<Admission, CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            State::Closed => Ok(Admission::Normal),
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_duration {
                    inner.state = State::HalfOpen;
                    inner.trial_in_flight = true;
                    self.publish_state(State::HalfOpen);
                    tracing::info!(
                        breaker = %self.name,
                        elapsed_seconds = elapsed.as_secs(),
                        "Circuit breaker attempting recovery (half-open state)"
                    );
                    Ok(Admission::Trial)
                } else {
                    let remaining = self.config.open_duration - elapsed;
                    tracing::debug!(
                        breaker = %self.name,
                        remaining_ms = remaining.as_millis() as u64,
                        "Circuit breaker OPEN - rejecting request"
                    );
                    Err(CircuitBreakerError::Open { remaining })
                }
            }
            State::HalfOpen if inner.trial_in_flight => Err(CircuitBreakerError::Open {
                remaining: Duration::ZERO,
            }),
            State::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Admission::Trial)
            }
        }
    }

    async fn record(&self, admission: Admission, failed: bool) {
        let mut inner = self.inner.lock().await;

        if admission == Admission::Trial {
            inner.trial_in_flight = false;
            if inner.state != State::HalfOpen {
                // Forced open or closed while the trial was running
                return;
            }
            if failed {
                self.open(&mut inner);
                tracing::warn!(breaker = %self.name, "Circuit breaker trial failed, re-opened");
            } else {
                self.close(&mut inner);
                tracing::info!(breaker = %self.name, "Circuit breaker recovered (closed)");
            }
            return;
        }

        if inner.state != State::Closed {
            return;
        }

        let now = Instant::now();
        inner.samples.push_back((now, failed));
        while let Some(&(at, _)) = inner.samples.front() {
            if now.duration_since(at) > self.config.sampling_window {
                inner.samples.pop_front();
            } else {
                break;
            }
        }

        let total = inner.samples.len();
        if total < self.config.failure_threshold as usize {
            return;
        }

        let failures = inner.samples.iter().filter(|(_, failed)| *failed).count();
        let ratio = failures as f64 / total as f64;
        if failures > 0 && ratio >= self.config.failure_ratio {
            self.open(&mut inner);
            tracing::error!(
                breaker = %self.name,
                failures = failures,
                samples = total,
                open_duration_seconds = self.config.open_duration.as_secs(),
                "Circuit breaker OPENED"
            );
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = State::Open;
        inner.opened_at = Some(Instant::now());
        inner.samples.clear();
        self.publish_state(State::Open);
    }

    fn close(&self, inner: &mut Inner) {
        inner.state = State::Closed;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        inner.samples.clear();
        self.publish_state(State::Closed);
    }

    fn publish_state(&self, state: State) {
        CIRCUIT_BREAKER_STATE
            .with_label_values(&[self.name.as_str()])
            .set(state.gauge_value());
    }
}
