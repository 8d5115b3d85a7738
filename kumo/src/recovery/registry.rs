//! The process-wide strategy registry.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{AgentError, Result};

use super::strategy::{ExponentialBackoff, LinearBackoff, NoRetry, SharedStrategy};

static GLOBAL: LazyLock<StrategyRegistry> = LazyLock::new(StrategyRegistry::with_defaults);

/// Named lookup table for recovery strategies.
///
/// The global table is initialised once with the default backoff
/// strategies and is read-only in the hot path; registration of custom
/// strategies belongs in process start-up.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<String, SharedStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field(
                "strategies",
                &self
                    .strategies
                    .read()
                    .map(|strategies| strategies.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default(),
            )
            .finish()
    }
}

impl StrategyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `exponential_backoff`,
    /// `linear_backoff`, and `no_retry`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let defaults: Vec<SharedStrategy> = vec![
            Arc::new(ExponentialBackoff::default()),
            Arc::new(LinearBackoff::new(3, std::time::Duration::from_millis(250))),
            Arc::new(NoRetry),
        ];
        for strategy in defaults {
            registry
                .register(strategy)
                .expect("default strategy names are unique");
        }
        registry
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register a strategy under its name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the name is already taken.
    pub fn register(&self, strategy: SharedStrategy) -> Result<()> {
        let name = strategy.name().to_string();
        let mut table = self.strategies.write().expect("strategy registry poisoned");
        if table.contains_key(&name) {
            return Err(AgentError::configuration(format!(
                "recovery strategy '{name}' is already registered"
            )));
        }
        table.insert(name, strategy);
        Ok(())
    }

    /// Look up a strategy by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedStrategy> {
        self.strategies
            .read()
            .expect("strategy registry poisoned")
            .get(name)
            .map(Arc::clone)
    }

    /// Registered strategy names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategies
            .read()
            .expect("strategy registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
