//! The strategy trait and the delay-based strategies.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{AgentError, Result};

/// A shared, type-erased recovery strategy.
pub type SharedStrategy = Arc<dyn RecoveryStrategy>;

/// A named retry policy.
///
/// `max_attempts` counts total attempts including the first; `delay_for`
/// returns the wait before the given attempt (attempt 0, the first try,
/// always waits zero).
pub trait RecoveryStrategy: Send + Sync {
    /// The strategy's name, used for registry lookup.
    fn name(&self) -> &str;

    /// Total attempts allowed, including the first.
    fn max_attempts(&self) -> usize;

    /// Delay before attempt `attempt` (0-based).
    fn delay_for(&self, attempt: usize) -> Duration;

    /// Whether the strategy is willing to retry after `error`.
    fn can_recover(&self, error: &AgentError) -> bool;

    /// Gate called before each attempt. The circuit breaker rejects here
    /// while open.
    ///
    /// # Errors
    ///
    /// Returns the error that should be reported instead of attempting.
    fn before_attempt(&self) -> Result<()> {
        Ok(())
    }

    /// Record a successful attempt.
    fn record_success(&self) {}

    /// Record a failed attempt.
    fn record_failure(&self) {}

    /// A substitute value for the failed operation, when the strategy can
    /// produce one (see [`Fallback`]).
    fn fallback_value(&self, _error: &AgentError) -> Option<Result<Value>> {
        None
    }
}

/// Exponential backoff with ±20% jitter.
///
/// `delay(n) = min(max_delay, base_delay · 2^(n-1))`, jittered. Recovers
/// only retryable errors.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    name: String,
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a strategy with explicit bounds.
    #[must_use]
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            name: "exponential_backoff".to_string(),
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Override the registry name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(30))
    }
}

impl RecoveryStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let raw = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        // ±20% jitter spreads simultaneous retries apart.
        let factor = 0.8 + 0.4 * fastrand::f64();
        raw.mul_f64(factor)
    }

    fn can_recover(&self, error: &AgentError) -> bool {
        error.retryable
    }
}

/// Linearly increasing backoff: `delay(n) = increment · n`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    name: String,
    max_attempts: usize,
    increment: Duration,
}

impl LinearBackoff {
    /// Create a strategy with the given per-attempt increment.
    #[must_use]
    pub fn new(max_attempts: usize, increment: Duration) -> Self {
        Self {
            name: "linear_backoff".to_string(),
            max_attempts: max_attempts.max(1),
            increment,
        }
    }

    /// Override the registry name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl RecoveryStrategy for LinearBackoff {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        self.increment
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }

    fn can_recover(&self, error: &AgentError) -> bool {
        error.retryable
    }
}

/// Never recovers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RecoveryStrategy for NoRetry {
    fn name(&self) -> &str {
        "no_retry"
    }

    fn max_attempts(&self) -> usize {
        1
    }

    fn delay_for(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }

    fn can_recover(&self, _error: &AgentError) -> bool {
        false
    }
}

/// Produces a substitute value instead of retrying. One attempt, no delay.
pub struct Fallback {
    name: String,
    handler: Arc<dyn Fn(&AgentError) -> Result<Value> + Send + Sync>,
}

impl Fallback {
    /// Create a fallback from a handler. The handler receives the failed
    /// operation's error (with its accumulated context) and returns the
    /// replacement value.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&AgentError) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: "fallback".to_string(),
            handler: Arc::new(handler),
        }
    }

    /// Override the registry name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl std::fmt::Debug for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback").field("name", &self.name).finish_non_exhaustive()
    }
}

impl RecoveryStrategy for Fallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_attempts(&self) -> usize {
        1
    }

    fn delay_for(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }

    fn can_recover(&self, _error: &AgentError) -> bool {
        true
    }

    fn fallback_value(&self, error: &AgentError) -> Option<Result<Value>> {
        Some((self.handler)(error))
    }
}

/// Tries each child strategy in order until one succeeds.
///
/// `max_attempts` is the sum of the children's attempts; attempt indices
/// map onto children by cumulative position.
pub struct CompositeStrategy {
    name: String,
    children: Vec<SharedStrategy>,
}

impl CompositeStrategy {
    /// Create a composite over the given children.
    #[must_use]
    pub fn new(children: Vec<SharedStrategy>) -> Self {
        Self {
            name: "composite".to_string(),
            children,
        }
    }

    /// Override the registry name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The child owning the given global attempt index, with the attempt
    /// index local to that child.
    fn child_for(&self, attempt: usize) -> Option<(&SharedStrategy, usize)> {
        let mut offset = 0;
        for child in &self.children {
            let span = child.max_attempts();
            if attempt < offset + span {
                return Some((child, attempt - offset));
            }
            offset += span;
        }
        None
    }
}

impl std::fmt::Debug for CompositeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeStrategy")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .finish()
    }
}

impl RecoveryStrategy for CompositeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_attempts(&self) -> usize {
        self.children.iter().map(|c| c.max_attempts()).sum()
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        self.child_for(attempt)
            .map_or(Duration::ZERO, |(child, local)| child.delay_for(local))
    }

    fn can_recover(&self, error: &AgentError) -> bool {
        self.children.iter().any(|c| c.can_recover(error))
    }

    fn fallback_value(&self, error: &AgentError) -> Option<Result<Value>> {
        self.children
            .iter()
            .find_map(|c| c.fallback_value(error))
    }
}
