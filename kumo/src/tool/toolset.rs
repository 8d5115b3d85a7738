//! Per-agent tool table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::ToolDefinition;

use super::traits::{SharedTool, Tool};

/// An insertion-ordered collection of tools owned by one agent.
///
/// Distinct from the process-wide [`ToolRegistry`](super::ToolRegistry):
/// the toolbox is what a single agent exposes to its model, and later
/// additions under an existing name replace the earlier tool.
#[derive(Default, Clone)]
pub struct ToolBox {
    order: Vec<String>,
    tools: HashMap<String, SharedTool>,
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox").field("names", &self.order).finish()
    }
}

impl ToolBox {
    /// Create an empty toolbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Replaces any existing tool with the same name, keeping
    /// the original position in the catalog order.
    pub fn add(&mut self, tool: impl Tool + 'static) {
        self.add_shared(Arc::new(tool));
    }

    /// Add an already-shared tool.
    pub fn add_shared(&mut self, tool: SharedTool) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SharedTool> {
        self.tools.get(name)
    }

    /// Whether a tool with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Provider definitions for every tool, in insertion order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the toolbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
