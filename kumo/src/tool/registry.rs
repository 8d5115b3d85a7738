//! The process-wide tool registry.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{AgentError, Result};

use super::traits::SharedTool;

static GLOBAL: LazyLock<ToolRegistry> = LazyLock::new(ToolRegistry::new);

/// Process-wide tool table.
///
/// Each tool registers at most once under its name; registration is
/// process-lifetime and the table is read-only in the hot path. Agents
/// resolve tools from their own [`ToolBox`](super::ToolBox) first; the
/// registry backs discovery and cross-agent sharing.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, SharedTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self
                    .tools
                    .read()
                    .map(|tools| tools.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default(),
            )
            .finish()
    }
}

impl ToolRegistry {
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

    /// Register a tool under its name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the name is already registered.
    pub fn register(&self, tool: SharedTool) -> Result<()> {
        let name = tool.name().to_string();
        let mut table = self.tools.write().expect("tool registry poisoned");
        if table.contains_key(&name) {
            return Err(AgentError::configuration(format!(
                "tool '{name}' is already registered"
            )));
        }
        table.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedTool> {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .get(name)
            .map(Arc::clone)
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry poisoned").len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
