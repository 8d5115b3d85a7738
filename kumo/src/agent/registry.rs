//! The process-wide agent registry.
//!
//! Sub-agents are referenced by name, never by pointer: an agent
//! configured with sub-agents resolves them from this registry when its
//! synthetic `transfer_to_<name>` tool fires. Name-based references keep
//! agent graphs acyclic even when agents mention each other.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{AgentError, Result};

use super::SharedAgent;

static GLOBAL: LazyLock<AgentRegistry> = LazyLock::new(AgentRegistry::new);

/// Named lookup table for agents.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, SharedAgent>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register an agent under its name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the name is already registered.
    pub fn register(&self, agent: SharedAgent) -> Result<()> {
        let name = agent.name().to_string();
        let mut table = self.agents.write().expect("agent registry poisoned");
        if table.contains_key(&name) {
            return Err(AgentError::configuration(format!(
                "agent '{name}' is already registered"
            )));
        }
        table.insert(name, agent);
        Ok(())
    }

    /// Look up an agent by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedAgent> {
        self.agents
            .read()
            .expect("agent registry poisoned")
            .get(name)
            .map(Arc::clone)
    }

    /// Remove an agent, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.agents
            .write()
            .expect("agent registry poisoned")
            .remove(name)
            .is_some()
    }

    /// Registered agent names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .agents
            .read()
            .expect("agent registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
