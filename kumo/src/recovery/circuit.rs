//! Circuit breaker.
//!
//! Per-instance state machine over `{closed, open, half-open}`:
//! consecutive failures in `closed` count toward `failure_threshold`; at
//! the threshold the breaker opens and rejects calls until
//! `reset_timeout` elapses, then admits a single probe (`half-open`). A
//! probe success closes the circuit, a probe failure re-opens it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{AgentError, Result};

use super::strategy::RecoveryStrategy;

/// The observable state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow; failures are counted.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One probe call is admitted.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

/// A circuit breaker, usable directly or as a [`RecoveryStrategy`].
///
/// State is guarded by a mutex and never held across awaits; the breaker
/// is per-instance, shared only where callers deliberately share it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and probes again after `reset_timeout`.
    #[must_use]
    pub fn new(failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            name: "circuit_breaker".to_string(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Override the registry name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The current state, advancing `open → half-open` when the reset
    /// timeout has elapsed.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut guard = self.state.lock().expect("circuit breaker lock poisoned");
        if guard.state == CircuitState::Open {
            let elapsed = guard
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.reset_timeout);
            if elapsed {
                guard.state = CircuitState::HalfOpen;
            }
        }
        guard.state
    }

    /// Admit or reject a call.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::CircuitOpen`](crate::ErrorCode::CircuitOpen)
    /// while the circuit is open.
    pub fn try_acquire(&self) -> Result<()> {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => Err(AgentError::circuit_open(&self.name)),
        }
    }

    /// Record a successful call. In `half-open` this closes the circuit.
    pub fn record_success(&self) {
        let mut guard = self.state.lock().expect("circuit breaker lock poisoned");
        guard.state = CircuitState::Closed;
        guard.consecutive_failures = 0;
        guard.opened_at = None;
    }

    /// Record a failed call. In `closed` this counts toward the threshold;
    /// in `half-open` it re-opens immediately.
    pub fn record_failure(&self) {
        let mut guard = self.state.lock().expect("circuit breaker lock poisoned");
        match guard.state {
            CircuitState::Closed => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
            }
        }
    }
}

impl RecoveryStrategy for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_attempts(&self) -> usize {
        1
    }

    fn delay_for(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }

    fn can_recover(&self, error: &AgentError) -> bool {
        error.retryable
    }

    fn before_attempt(&self) -> Result<()> {
        self.try_acquire()
    }

    fn record_success(&self) {
        Self::record_success(self);
    }

    fn record_failure(&self) {
        Self::record_failure(self);
    }
}
