//! Tools: the callable surface agents expose to their models.
//!
//! A [`Tool`] pairs a schema-described interface with an async
//! implementation receiving a [`ToolContext`]. Agents keep their own
//! [`ToolBox`]; the [`ToolRegistry`] is the process-wide table used for
//! discovery and sub-agent tool synthesis.

mod context;
mod metadata;
mod registry;
mod toolset;
mod traits;

pub use context::ToolContext;
pub use metadata::{LatencyClass, ResourceHints, ToolExample, ToolMetadata};
pub use registry::ToolRegistry;
pub use toolset::ToolBox;
pub use traits::{tool, FnTool, SharedTool, Tool, ToolBuilder, ToolError};
