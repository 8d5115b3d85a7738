//! The tool contract and the closure-based tool adapter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::AgentError;
use crate::output::OutputSchema;
use crate::provider::ToolDefinition;
use crate::recovery::SharedStrategy;

use super::context::ToolContext;
use super::metadata::ToolMetadata;

/// Failures a tool can report.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments did not satisfy the parameter schema.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// The tool's own logic failed.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The tool exceeded its deadline.
    #[error("timed out")]
    Timeout,
}

impl ToolError {
    /// Promote to a typed error attributed to `tool_name`.
    #[must_use]
    pub fn into_agent_error(self, tool_name: &str) -> AgentError {
        match self {
            Self::InvalidParameters(message) => {
                AgentError::tool_invalid_parameters(tool_name, message)
            }
            Self::Execution(message) => AgentError::tool_execution(tool_name, message),
            Self::Timeout => AgentError::tool_timeout(tool_name),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Execution(format!("JSON error: {err}"))
    }
}

/// A named, schema-described callable an agent can invoke.
///
/// # Example
///
/// ```rust,ignore
/// struct Adder;
///
/// #[async_trait]
/// impl Tool for Adder {
///     fn name(&self) -> &str { "add" }
///     fn description(&self) -> String { "Add two numbers.".into() }
///     fn parameters_schema(&self) -> OutputSchema {
///         OutputSchema::object()
///             .with_required_property("a", OutputSchema::number())
///             .with_required_property("b", OutputSchema::number())
///     }
///     async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
///         let a = args["a"].as_f64().unwrap_or_default();
///         let b = args["b"].as_f64().unwrap_or_default();
///         Ok(serde_json::json!({"result": a + b}))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (snake_case).
    fn name(&self) -> &str;

    /// What the tool does, sent to the model.
    fn description(&self) -> String;

    /// Schema for the tool's arguments.
    fn parameters_schema(&self) -> OutputSchema;

    /// Schema for the tool's result, when declared.
    fn output_schema(&self) -> Option<OutputSchema> {
        None
    }

    /// Discovery metadata.
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    /// Retry policy for execution errors. `None` means no retries (a
    /// timeout still gets the engine's single default retry).
    fn retry_strategy(&self) -> Option<SharedStrategy> {
        None
    }

    /// The schema-only definition sent to providers.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description(),
            parameters: self.parameters_schema().to_value(),
        }
    }

    /// Execute with parsed arguments.
    async fn call(&self, ctx: &ToolContext, arguments: Value)
        -> std::result::Result<Value, ToolError>;
}

/// A shared, type-erased tool.
pub type SharedTool = Arc<dyn Tool>;

type ToolHandler = Arc<
    dyn Fn(ToolContext, Value) -> Pin<Box<dyn Future<Output = std::result::Result<Value, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A tool built from an async closure.
pub struct FnTool {
    name: String,
    description: String,
    parameters: OutputSchema,
    output: Option<OutputSchema>,
    metadata: ToolMetadata,
    retry: Option<SharedStrategy>,
    handler: ToolHandler,
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn parameters_schema(&self) -> OutputSchema {
        self.parameters.clone()
    }

    fn output_schema(&self) -> Option<OutputSchema> {
        self.output.clone()
    }

    fn metadata(&self) -> ToolMetadata {
        self.metadata.clone()
    }

    fn retry_strategy(&self) -> Option<SharedStrategy> {
        self.retry.clone()
    }

    async fn call(
        &self,
        ctx: &ToolContext,
        arguments: Value,
    ) -> std::result::Result<Value, ToolError> {
        (self.handler)(ctx.clone(), arguments).await
    }
}

/// Fluent builder for [`FnTool`].
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: OutputSchema,
    output: Option<OutputSchema>,
    metadata: ToolMetadata,
    retry: Option<SharedStrategy>,
}

impl std::fmt::Debug for ToolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("output", &self.output)
            .field("metadata", &self.metadata)
            .field("retry", &self.retry.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl ToolBuilder {
    /// Start building a tool.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: OutputSchema::object(),
            output: None,
            metadata: ToolMetadata::default(),
            retry: None,
        }
    }

    /// Add a required parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, schema: OutputSchema) -> Self {
        self.parameters = self.parameters.with_required_property(name, schema);
        self
    }

    /// Add an optional parameter.
    #[must_use]
    pub fn optional_param(mut self, name: impl Into<String>, schema: OutputSchema) -> Self {
        self.parameters = self.parameters.with_property(name, schema);
        self
    }

    /// Replace the whole parameter schema.
    #[must_use]
    pub fn schema(mut self, schema: OutputSchema) -> Self {
        self.parameters = schema;
        self
    }

    /// Declare the result schema.
    #[must_use]
    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.output = Some(schema);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a retry strategy for execution errors.
    #[must_use]
    pub fn retry_strategy(mut self, strategy: SharedStrategy) -> Self {
        self.retry = Some(strategy);
        self
    }

    /// Finalize with the handler.
    pub fn build<F, Fut>(self, handler: F) -> FnTool
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        FnTool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            output: self.output,
            metadata: self.metadata,
            retry: self.retry,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }
}

/// Start building a closure-based tool.
#[must_use]
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
