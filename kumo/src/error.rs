//! Typed errors for the kumo runtime.
//!
//! Every failure in the runtime is represented by [`AgentError`]: a code from
//! the dotted [`ErrorCode`] namespace, a human-readable message, an optional
//! typed cause, an accumulated context map, a captured stack, and the
//! `retryable`/`fatal` flags that recovery strategies consult.
//!
//! Errors wrap: [`AgentError::wrap`] preserves the cause chain, inherits the
//! cause's flags, and merges context maps (the child's keys win on collision).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A type alias for `Result<T, AgentError>`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Maximum number of stack frames captured into an [`AgentError`].
const MAX_STACK_FRAMES: usize = 20;

/// Machine-readable error codes, namespaced by subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The agent loop hit its iteration cap.
    #[serde(rename = "agent.iteration_cap_exceeded")]
    IterationCapExceeded,
    /// The LLM provider returned an error.
    #[serde(rename = "agent.provider_error")]
    ProviderError,
    /// The run was cancelled through its context.
    #[serde(rename = "agent.cancelled")]
    Cancelled,
    /// The model requested a tool that is not registered.
    #[serde(rename = "tool.not_found")]
    ToolNotFound,
    /// Tool parameters failed schema validation.
    #[serde(rename = "tool.invalid_parameters")]
    ToolInvalidParameters,
    /// The tool itself failed.
    #[serde(rename = "tool.execution_error")]
    ToolExecutionError,
    /// The tool exceeded its deadline.
    #[serde(rename = "tool.timeout")]
    ToolTimeout,
    /// A workflow child failed.
    #[serde(rename = "workflow.child_failed")]
    WorkflowChildFailed,
    /// A loop composite exceeded its iteration cap.
    #[serde(rename = "workflow.loop_cap_exceeded")]
    LoopCapExceeded,
    /// No recovery strategy could repair the input.
    #[serde(rename = "parse.unrecoverable")]
    ParseUnrecoverable,
    /// A value failed schema validation.
    #[serde(rename = "validation.schema_violation")]
    ValidationSchemaViolation,
    /// A circuit breaker rejected the call.
    #[serde(rename = "circuit.open")]
    CircuitOpen,
    /// Invalid runtime configuration.
    #[serde(rename = "config.invalid")]
    Configuration,
    /// An internal invariant was violated.
    #[serde(rename = "internal.error")]
    Internal,
}

impl ErrorCode {
    /// The dotted string form of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IterationCapExceeded => "agent.iteration_cap_exceeded",
            Self::ProviderError => "agent.provider_error",
            Self::Cancelled => "agent.cancelled",
            Self::ToolNotFound => "tool.not_found",
            Self::ToolInvalidParameters => "tool.invalid_parameters",
            Self::ToolExecutionError => "tool.execution_error",
            Self::ToolTimeout => "tool.timeout",
            Self::WorkflowChildFailed => "workflow.child_failed",
            Self::LoopCapExceeded => "workflow.loop_cap_exceeded",
            Self::ParseUnrecoverable => "parse.unrecoverable",
            Self::ValidationSchemaViolation => "validation.schema_violation",
            Self::CircuitOpen => "circuit.open",
            Self::Configuration => "config.invalid",
            Self::Internal => "internal.error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single captured stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Fully qualified function name.
    pub function: String,
    /// Source file, when resolvable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number, when resolvable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// The main error type for runtime operations.
///
/// `retryable` and `fatal` are independent: a retryable error may still be
/// fatal for a particular caller, and a non-retryable error is not
/// necessarily fatal (e.g. invalid tool parameters are surfaced back to the
/// model for self-correction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentError {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// The wrapped cause, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AgentError>>,
    /// Accumulated context. Merged on wrap; child keys win.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    /// Captured stack frames, newest first. Runtime frames are skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<StackFrame>,
    /// When the error was created.
    pub timestamp: DateTime<Utc>,
    /// Whether a recovery strategy may retry the failed operation.
    pub retryable: bool,
    /// Whether the error should abort the enclosing run.
    pub fatal: bool,
    /// Name of the recovery strategy to apply, if one was assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_strategy: Option<String>,
}

impl AgentError {
    /// Create an error with explicit flags.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool, fatal: bool) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            context: BTreeMap::new(),
            stack: capture_stack(),
            timestamp: Utc::now(),
            retryable,
            fatal,
            recovery_strategy: None,
        }
    }

    /// The agent loop hit its iteration cap. Fatal, not retryable.
    #[must_use]
    pub fn iteration_cap_exceeded(cap: usize) -> Self {
        Self::new(
            ErrorCode::IterationCapExceeded,
            format!("agent exceeded iteration cap of {cap}"),
            false,
            true,
        )
        .with_context("iteration_cap", Value::from(cap))
    }

    /// A provider-level failure. Retryable iff the cause is retryable.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderError, message, false, true)
    }

    /// The run was cancelled. Fatal, not retryable.
    #[must_use]
    pub fn cancelled(what: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Cancelled,
            format!("cancelled: {}", what.into()),
            false,
            true,
        )
    }

    /// The model named a tool that does not exist. Fatal.
    #[must_use]
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ToolNotFound,
            format!("tool '{name}' not found"),
            false,
            true,
        )
        .with_context("tool_name", Value::String(name))
    }

    /// Tool parameters failed validation. Surfaced to the model, not retried.
    #[must_use]
    pub fn tool_invalid_parameters(tool: impl Into<String>, message: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::ToolInvalidParameters,
            format!("invalid parameters for tool '{tool}': {}", message.into()),
            false,
            false,
        )
        .with_context("tool_name", Value::String(tool))
    }

    /// A tool failed during execution. Retryable per the tool's policy.
    #[must_use]
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::ToolExecutionError,
            format!("tool '{tool}' failed: {}", message.into()),
            true,
            false,
        )
        .with_context("tool_name", Value::String(tool))
    }

    /// A tool exceeded its deadline. Retryable once by default.
    #[must_use]
    pub fn tool_timeout(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::ToolTimeout,
            format!("tool '{tool}' timed out"),
            true,
            false,
        )
        .with_context("tool_name", Value::String(tool))
    }

    /// A workflow child failed. `retryable` is the conjunction of the
    /// contributing children's flags, computed by the composite.
    #[must_use]
    pub fn workflow_child_failed(child: impl Into<String>, retryable: bool) -> Self {
        let child = child.into();
        Self::new(
            ErrorCode::WorkflowChildFailed,
            format!("workflow child '{child}' failed"),
            retryable,
            false,
        )
        .with_context("child", Value::String(child))
    }

    /// A loop composite ran past its iteration cap.
    #[must_use]
    pub fn loop_cap_exceeded(cap: usize) -> Self {
        Self::new(
            ErrorCode::LoopCapExceeded,
            format!("loop exceeded iteration cap of {cap}"),
            false,
            true,
        )
        .with_context("loop_cap", Value::from(cap))
    }

    /// All recovery attempts failed to produce a parseable value.
    #[must_use]
    pub fn parse_unrecoverable(format: impl Into<String>, message: impl Into<String>) -> Self {
        let format = format.into();
        Self::new(
            ErrorCode::ParseUnrecoverable,
            format!("unrecoverable {format} parse failure: {}", message.into()),
            false,
            false,
        )
        .with_context("format", Value::String(format))
    }

    /// A value violated its schema.
    #[must_use]
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationSchemaViolation, message, false, false)
    }

    /// A circuit breaker is open. Retryable after the reset timeout.
    #[must_use]
    pub fn circuit_open(strategy: impl Into<String>) -> Self {
        let strategy = strategy.into();
        Self::new(
            ErrorCode::CircuitOpen,
            format!("circuit '{strategy}' is open"),
            true,
            false,
        )
        .with_context("strategy", Value::String(strategy))
    }

    /// Invalid configuration.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, message, false, true)
    }

    /// An internal invariant was violated.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, false, true)
    }

    /// Attach a context entry, returning `self` for chaining.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Assign the recovery strategy to apply for this error.
    #[must_use]
    pub fn with_recovery_strategy(mut self, name: impl Into<String>) -> Self {
        self.recovery_strategy = Some(name.into());
        self
    }

    /// Wrap `cause` under a new code and message.
    ///
    /// The new error inherits the cause's `retryable`/`fatal` flags and
    /// absorbs its context map; keys already present on the cause win over
    /// keys later attached to the wrapper.
    #[must_use]
    pub fn wrap(code: ErrorCode, message: impl Into<String>, cause: Self) -> Self {
        let mut err = Self::new(code, message, cause.retryable, cause.fatal);
        err.context = cause.context.clone();
        err.cause = Some(Box::new(cause));
        err
    }

    /// The innermost error in the cause chain.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        let mut current = self;
        while let Some(cause) = current.cause.as_deref() {
            current = cause;
        }
        current
    }

    /// Serialize to the canonical JSON error form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "code": self.code.as_str(),
                "message": self.message,
            })
        })
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(cause) = self.cause.as_deref() {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {err}"))
    }
}

/// Capture the current call stack, skipping runtime and std frames.
fn capture_stack() -> Vec<StackFrame> {
    let backtrace = std::backtrace::Backtrace::force_capture();
    let rendered = format!("{backtrace}");
    let mut frames = Vec::new();
    let mut pending: Option<StackFrame> = None;

    for line in rendered.lines() {
        let trimmed = line.trim();
        // Frame lines look like "12: path::to::function"; the following
        // line, when present, is "at src/file.rs:42:7".
        if let Some(rest) = trimmed.split_once(": ").and_then(|(idx, rest)| {
            idx.trim().parse::<usize>().ok().map(|_| rest)
        }) {
            if let Some(frame) = pending.take() {
                frames.push(frame);
            }
            if is_runtime_frame(rest) {
                pending = None;
            } else {
                pending = Some(StackFrame {
                    function: rest.to_string(),
                    file: None,
                    line: None,
                });
            }
        } else if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(frame) = pending.as_mut() {
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                let line_no = parts.next().and_then(|l| l.parse().ok());
                let file = parts.next().map(String::from);
                frame.line = line_no;
                frame.file = file;
            }
        }
        if frames.len() >= MAX_STACK_FRAMES {
            pending = None;
            break;
        }
    }
    if let Some(frame) = pending {
        if frames.len() < MAX_STACK_FRAMES {
            frames.push(frame);
        }
    }
    frames
}

/// Frames belonging to the runtime machinery rather than user code.
fn is_runtime_frame(function: &str) -> bool {
    const SKIP: &[&str] = &[
        "std::",
        "core::",
        "alloc::",
        "tokio::",
        "futures::",
        "backtrace::",
        "__rust",
        "rust_begin_unwind",
        "kumo::error::capture_stack",
    ];
    SKIP.iter().any(|prefix| function.starts_with(prefix))
}

/// Collects errors from parallel operations.
///
/// Thread-safe; insertion order is preserved so a merged report lists
/// contributors in the order they failed.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Mutex<Vec<AgentError>>,
}

impl ErrorAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn add(&self, error: AgentError) {
        self.errors
            .lock()
            .expect("error aggregator lock poisoned")
            .push(error);
    }

    /// A snapshot of the collected errors, in insertion order.
    #[must_use]
    pub fn errors(&self) -> Vec<AgentError> {
        self.errors
            .lock()
            .expect("error aggregator lock poisoned")
            .clone()
    }

    /// Whether any errors were recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self
            .errors
            .lock()
            .expect("error aggregator lock poisoned")
            .is_empty()
    }

    /// Number of recorded errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .expect("error aggregator lock poisoned")
            .len()
    }

    /// Whether the aggregator is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_errors()
    }

    /// Discard all recorded errors.
    pub fn clear(&self) {
        self.errors
            .lock()
            .expect("error aggregator lock poisoned")
            .clear();
    }

    /// Merge the collected errors into a single typed error.
    ///
    /// Returns `None` when nothing was recorded. The merged error's context
    /// carries every contributor (with its own context) under `"errors"`,
    /// and is retryable only if every contributor is retryable.
    #[must_use]
    pub fn into_error(self, code: ErrorCode, message: impl Into<String>) -> Option<AgentError> {
        let errors = self.errors.into_inner().expect("error aggregator lock poisoned");
        if errors.is_empty() {
            return None;
        }
        let retryable = errors.iter().all(|e| e.retryable);
        let fatal = errors.iter().any(|e| e.fatal);
        let contributors: Vec<Value> = errors.iter().map(AgentError::to_json).collect();
        Some(
            AgentError::new(code, message, retryable, fatal)
                .with_context("error_count", Value::from(errors.len()))
                .with_context("errors", Value::Array(contributors)),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod construction {
        use super::*;

        #[test]
        fn iteration_cap_is_fatal_not_retryable() {
            let err = AgentError::iteration_cap_exceeded(25);
            assert_eq!(err.code, ErrorCode::IterationCapExceeded);
            assert!(err.fatal);
            assert!(!err.retryable);
            assert_eq!(err.context["iteration_cap"], Value::from(25));
        }

        #[test]
        fn tool_execution_is_retryable() {
            let err = AgentError::tool_execution("fetch", "connection reset");
            assert!(err.retryable);
            assert!(!err.fatal);
            assert_eq!(err.context["tool_name"], Value::from("fetch"));
        }

        #[test]
        fn invalid_parameters_not_retryable_not_fatal() {
            let err = AgentError::tool_invalid_parameters("add", "missing 'a'");
            assert!(!err.retryable);
            assert!(!err.fatal);
        }

        #[test]
        fn code_round_trips_through_serde() {
            let json = serde_json::to_value(ErrorCode::CircuitOpen).unwrap();
            assert_eq!(json, Value::from("circuit.open"));
            let code: ErrorCode = serde_json::from_value(json).unwrap();
            assert_eq!(code, ErrorCode::CircuitOpen);
        }
    }

    mod wrapping {
        use super::*;

        #[test]
        fn wrap_inherits_flags_and_context() {
            let cause = AgentError::tool_execution("fetch", "boom")
                .with_context("attempt", Value::from(3));
            let err = AgentError::wrap(ErrorCode::WorkflowChildFailed, "step failed", cause);
            assert!(err.retryable);
            assert!(!err.fatal);
            assert_eq!(err.context["attempt"], Value::from(3));
            assert_eq!(err.context["tool_name"], Value::from("fetch"));
            assert_eq!(err.cause.as_ref().unwrap().code, ErrorCode::ToolExecutionError);
        }

        #[test]
        fn root_cause_walks_the_chain() {
            let inner = AgentError::provider("upstream 500");
            let mid = AgentError::wrap(ErrorCode::ToolExecutionError, "call failed", inner);
            let outer = AgentError::wrap(ErrorCode::WorkflowChildFailed, "child failed", mid);
            assert_eq!(outer.root_cause().code, ErrorCode::ProviderError);
        }

        #[test]
        fn display_includes_cause_chain() {
            let cause = AgentError::tool_not_found("ghost");
            let err = AgentError::wrap(ErrorCode::WorkflowChildFailed, "step 2 failed", cause);
            let text = err.to_string();
            assert!(text.contains("workflow.child_failed"));
            assert!(text.contains("tool.not_found"));
        }
    }

    mod serialization {
        use super::*;

        #[test]
        fn json_form_carries_code_and_flags() {
            let err = AgentError::tool_timeout("slow");
            let json = err.to_json();
            assert_eq!(json["code"], Value::from("tool.timeout"));
            assert_eq!(json["retryable"], Value::from(true));
            assert_eq!(json["fatal"], Value::from(false));
            assert!(json["timestamp"].is_string());
        }

        #[test]
        fn round_trips_through_serde() {
            let err = AgentError::tool_execution("t", "m").with_context("k", Value::from(1));
            let json = serde_json::to_string(&err).unwrap();
            let back: AgentError = serde_json::from_str(&json).unwrap();
            assert_eq!(back.code, err.code);
            assert_eq!(back.context, err.context);
        }
    }

    mod aggregator {
        use super::*;

        #[test]
        fn preserves_insertion_order() {
            let agg = ErrorAggregator::new();
            agg.add(AgentError::tool_execution("a", "first"));
            agg.add(AgentError::tool_execution("b", "second"));
            let errors = agg.errors();
            assert_eq!(errors.len(), 2);
            assert!(errors[0].message.contains("first"));
            assert!(errors[1].message.contains("second"));
        }

        #[test]
        fn empty_aggregator_yields_no_error() {
            let agg = ErrorAggregator::new();
            assert!(!agg.has_errors());
            assert!(agg.into_error(ErrorCode::WorkflowChildFailed, "none").is_none());
        }

        #[test]
        fn merged_error_lists_contributors() {
            let agg = ErrorAggregator::new();
            agg.add(AgentError::tool_execution("a", "x"));
            agg.add(AgentError::tool_not_found("b"));
            let merged = agg
                .into_error(ErrorCode::WorkflowChildFailed, "2 children failed")
                .unwrap();
            assert_eq!(merged.context["error_count"], Value::from(2));
            let contributors = merged.context["errors"].as_array().unwrap();
            assert_eq!(contributors.len(), 2);
            // Not all contributors are retryable, so neither is the merge.
            assert!(!merged.retryable);
            // tool_not_found is fatal, so the merge is fatal.
            assert!(merged.fatal);
        }

        #[test]
        fn clear_empties_the_aggregator() {
            let agg = ErrorAggregator::new();
            agg.add(AgentError::internal("x"));
            agg.clear();
            assert!(agg.is_empty());
        }
    }
}
