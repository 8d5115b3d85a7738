//! Recovery strategies: named, composable retry policies.
//!
//! A [`RecoveryStrategy`] tells a caller whether a failed operation may be
//! retried ([`can_recover`](RecoveryStrategy::can_recover)), how many
//! attempts to make, and how long to wait between them. The circuit
//! breaker additionally gates attempts through its state machine via
//! [`before_attempt`](RecoveryStrategy::before_attempt) and the
//! `record_*` hooks.
//!
//! Strategies are registered by name in a process-wide
//! [`StrategyRegistry`]; the default backoff strategies are pre-registered.

mod circuit;
mod registry;
mod strategy;

pub use circuit::{CircuitBreaker, CircuitState};
pub use registry::StrategyRegistry;
pub use strategy::{
    CompositeStrategy, ExponentialBackoff, Fallback, LinearBackoff, NoRetry, RecoveryStrategy,
    SharedStrategy,
};
