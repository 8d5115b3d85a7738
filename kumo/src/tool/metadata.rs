//! Tool discovery metadata.
//!
//! Beyond its schema, a tool exposes metadata that catalogs and planners
//! consult: categorization, usage examples, constraints, permissions, and
//! the determinism/destructiveness/latency flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rough latency expectation for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    /// Sub-millisecond to a few milliseconds.
    #[default]
    Fast,
    /// Tens to hundreds of milliseconds.
    Moderate,
    /// Anything involving the network or heavy computation.
    Slow,
}

/// A worked example of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExample {
    /// What the example demonstrates.
    pub description: String,
    /// Example arguments.
    pub arguments: Value,
    /// Expected result, when illustrative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Expected resource usage of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceHints {
    /// Whether the tool reaches the network.
    #[serde(default)]
    pub network: bool,
    /// Whether the tool touches the filesystem.
    #[serde(default)]
    pub filesystem: bool,
    /// Rough memory expectation, free-form (`"low"`, `"~500MB"`, …).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Descriptive metadata attached to a tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Broad category (`"math"`, `"data"`, `"web"`, …).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Tool version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Worked invocation examples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<ToolExample>,
    /// Usage constraints, human-readable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    /// What the model should do when the tool errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_guidance: Option<String>,
    /// Permissions the tool needs to run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_permissions: Vec<String>,
    /// Resource expectations.
    #[serde(default)]
    pub resource_hints: ResourceHints,
    /// Whether identical arguments always produce identical results.
    #[serde(default)]
    pub deterministic: bool,
    /// Whether the tool mutates external state irreversibly.
    #[serde(default)]
    pub destructive: bool,
    /// Rough latency expectation.
    #[serde(default)]
    pub latency: LatencyClass,
}

impl ToolMetadata {
    /// Create empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add an example.
    #[must_use]
    pub fn with_example(mut self, example: ToolExample) -> Self {
        self.examples.push(example);
        self
    }

    /// Add a constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Set the error guidance text.
    #[must_use]
    pub fn with_error_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.error_guidance = Some(guidance.into());
        self
    }

    /// Require a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.push(permission.into());
        self
    }

    /// Mark the tool deterministic.
    #[must_use]
    pub const fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    /// Mark the tool destructive.
    #[must_use]
    pub const fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    /// Set the latency class.
    #[must_use]
    pub const fn with_latency(mut self, latency: LatencyClass) -> Self {
        self.latency = latency;
        self
    }
}
