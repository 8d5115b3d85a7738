//! The parser contract, the recovery driver, and the parser registry.

use std::sync::{Arc, LazyLock, RwLock};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::error::AgentError;

use super::recovery::{extract_markdown_fence, RecoveryOptions};
use super::schema::OutputSchema;
use super::validator::SchemaValidator;

/// Parse failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text is not valid in this parser's format.
    #[error("{format} syntax error: {message}")]
    Syntax {
        /// Format name.
        format: &'static str,
        /// Underlying parser message.
        message: String,
    },
    /// Every recovery attempt failed.
    #[error("{format} unrecoverable after {attempts} attempts: {message}")]
    Unrecoverable {
        /// Format name.
        format: &'static str,
        /// Attempts made before giving up.
        attempts: usize,
        /// The last failure.
        message: String,
    },
    /// The parsed value failed schema validation.
    #[error("schema validation failed: {0}")]
    SchemaViolation(String),
}

impl From<ParseError> for AgentError {
    fn from(err: ParseError) -> Self {
        match &err {
            ParseError::Syntax { format, .. } | ParseError::Unrecoverable { format, .. } => {
                Self::parse_unrecoverable(*format, err.to_string())
            }
            ParseError::SchemaViolation(message) => Self::schema_violation(message.clone()),
        }
    }
}

/// Where a parse sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No parse in flight.
    Idle,
    /// The verbatim attempt is running.
    Parsing,
    /// Recovery attempt `n` is running.
    Recovering(usize),
    /// A value was produced.
    Success,
    /// Attempts were exhausted.
    Failed,
}

/// A successful parse plus how hard it was.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// The parsed value.
    pub value: Value,
    /// Parse attempts made, including the successful one. `1` means the
    /// verbatim text parsed directly.
    pub attempts: usize,
    /// Name of the stage that produced the value.
    pub recovered_by: &'static str,
}

impl ParseOutcome {
    /// Recovery attempts beyond the verbatim parse.
    #[must_use]
    pub const fn recovery_attempts(&self) -> usize {
        self.attempts.saturating_sub(1)
    }
}

/// A format parser with multi-strategy recovery.
///
/// Implementations provide the verbatim [`parse`](OutputParser::parse) and
/// the format-specific transform hooks; the recovery pipeline itself is
/// shared. Stages run in a fixed order, each transforming the working text
/// and re-attempting the parse:
///
/// 1. verbatim text,
/// 2. markdown fence extraction,
/// 3. format-specific cleanup,
/// 4. format-specific common-issue fixes,
/// 5. block extraction,
/// 6. schema-guided structural hinting (when a schema is provided).
///
/// A stage whose transform leaves the text unchanged is skipped without
/// consuming an attempt, which keeps recovery monotonic in `max_attempts`.
pub trait OutputParser: Send + Sync {
    /// Format name (`"json"`, `"xml"`, `"yaml"`).
    fn name(&self) -> &'static str;

    /// Cheap heuristic: does the text look like this format?
    fn can_parse(&self, text: &str) -> bool;

    /// Parse the text verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Syntax`] when the text is invalid.
    fn parse(&self, text: &str) -> Result<Value, ParseError>;

    /// Stage 3: strip noise the format cannot tolerate.
    fn cleanup(&self, text: &str) -> String;

    /// Stage 4: repair the format's common LLM-output mistakes.
    fn fix_common_issues(&self, text: &str) -> String;

    /// Stage 5: cut the format's outermost block out of surrounding prose.
    fn extract_block(&self, text: &str) -> Option<String>;

    /// Stage 6: synthesize the outer shape the schema expects, when the
    /// text cannot be repaired directly.
    fn synthesize_with_schema(&self, _text: &str, _schema: &OutputSchema) -> Option<Value> {
        None
    }

    /// Parse with the recovery pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Unrecoverable`] when every permitted attempt
    /// fails.
    fn parse_with_recovery(
        &self,
        text: &str,
        options: &RecoveryOptions,
    ) -> Result<ParseOutcome, ParseError> {
        drive_recovery(self, text, options)
    }

    /// Parse with recovery, then validate against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::SchemaViolation`] when the parsed value does
    /// not satisfy the schema.
    fn parse_with_schema(&self, text: &str, schema: &OutputSchema) -> Result<Value, ParseError> {
        let options = RecoveryOptions::lenient().with_schema(schema.clone());
        let outcome = self.parse_with_recovery(text, &options)?;
        let report = SchemaValidator::validate(&outcome.value, schema);
        if report.valid {
            Ok(outcome.value)
        } else {
            Err(ParseError::SchemaViolation(report.summary()))
        }
    }
}

/// The shared recovery pipeline. `parser` is the dynamic receiver so the
/// trait stays object-safe.
fn drive_recovery(
    parser: &(impl OutputParser + ?Sized),
    text: &str,
    options: &RecoveryOptions,
) -> Result<ParseOutcome, ParseError> {
    let max_attempts = options.max_attempts.max(1);
    let mut state = ParserState::Parsing;
    let mut attempts = 0usize;
    let mut last_error = String::new();
    let mut current = text.to_string();

    let try_parse = |candidate: &str,
                         stage: &'static str,
                         attempts: &mut usize,
                         state: &mut ParserState,
                         last_error: &mut String|
     -> Option<ParseOutcome> {
        *attempts += 1;
        if *attempts > 1 {
            *state = ParserState::Recovering(*attempts - 1);
        }
        match parser.parse(candidate) {
            Ok(value) => {
                *state = ParserState::Success;
                Some(ParseOutcome {
                    value,
                    attempts: *attempts,
                    recovered_by: stage,
                })
            }
            Err(error) => {
                debug!(
                    parser = parser.name(),
                    stage,
                    attempt = *attempts,
                    %error,
                    "Parse attempt failed",
                );
                *last_error = error.to_string();
                None
            }
        }
    };

    // Stage 1: verbatim.
    if let Some(outcome) = try_parse(&current, "verbatim", &mut attempts, &mut state, &mut last_error)
    {
        return Ok(outcome);
    }
    if options.strict_mode {
        return Err(ParseError::Unrecoverable {
            format: parser.name(),
            attempts,
            message: last_error,
        });
    }

    // Stage 2: markdown fence extraction.
    if options.extract_from_markdown && attempts < max_attempts {
        if let Some(extracted) = extract_markdown_fence(&current, parser.name()) {
            if extracted != current {
                current = extracted;
                if let Some(outcome) =
                    try_parse(&current, "markdown_fence", &mut attempts, &mut state, &mut last_error)
                {
                    return Ok(outcome);
                }
            }
        }
    }

    // Stage 3: format-specific cleanup.
    if attempts < max_attempts {
        let cleaned = parser.cleanup(&current);
        if cleaned != current {
            current = cleaned;
            if let Some(outcome) =
                try_parse(&current, "cleanup", &mut attempts, &mut state, &mut last_error)
            {
                return Ok(outcome);
            }
        }
    }

    // Stage 4: common-issue fixes.
    if options.fix_common_issues && attempts < max_attempts {
        let fixed = parser.fix_common_issues(&current);
        if fixed != current {
            current = fixed;
            if let Some(outcome) =
                try_parse(&current, "common_fixes", &mut attempts, &mut state, &mut last_error)
            {
                return Ok(outcome);
            }
        }
    }

    // Stage 5: block extraction, re-applying fixes to the extracted block.
    if attempts < max_attempts {
        if let Some(block) = parser.extract_block(&current) {
            let block = if options.fix_common_issues {
                parser.fix_common_issues(&parser.cleanup(&block))
            } else {
                block
            };
            if block != current {
                current = block;
                if let Some(outcome) =
                    try_parse(&current, "block_extraction", &mut attempts, &mut state, &mut last_error)
                {
                    return Ok(outcome);
                }
            }
        }
    }

    // Stage 6: schema-guided structural hinting.
    if attempts < max_attempts {
        if let Some(schema) = &options.schema {
            attempts += 1;
            state = ParserState::Recovering(attempts - 1);
            if let Some(value) = parser.synthesize_with_schema(&current, schema) {
                return Ok(ParseOutcome {
                    value,
                    attempts,
                    recovered_by: "schema_hint",
                });
            }
        }
    }

    debug_assert!(matches!(state, ParserState::Recovering(_) | ParserState::Parsing));
    Err(ParseError::Unrecoverable {
        format: parser.name(),
        attempts,
        message: last_error,
    })
}

/// A shared, type-erased parser.
pub type SharedParser = Arc<dyn OutputParser>;

static GLOBAL: LazyLock<ParserRegistry> = LazyLock::new(ParserRegistry::with_defaults);

/// Insertion-ordered parser registry.
///
/// [`auto_detect`](ParserRegistry::auto_detect) walks parsers in
/// registration order, so detection is deterministic across runs; the
/// default registration order is JSON, XML, YAML.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: RwLock<Vec<SharedParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parsers", &self.names())
            .finish()
    }
}

impl ParserRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in parsers in detection order.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry
            .register(Arc::new(super::json::JsonParser))
            .expect("default parser names are unique");
        registry
            .register(Arc::new(super::xml::XmlParser::default()))
            .expect("default parser names are unique");
        registry
            .register(Arc::new(super::yaml::YamlParser))
            .expect("default parser names are unique");
        registry
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register a parser at the end of the detection order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the name is already registered.
    pub fn register(&self, parser: SharedParser) -> crate::error::Result<()> {
        let mut parsers = self.parsers.write().expect("parser registry poisoned");
        if parsers.iter().any(|p| p.name() == parser.name()) {
            return Err(AgentError::configuration(format!(
                "parser '{}' is already registered",
                parser.name()
            )));
        }
        parsers.push(parser);
        Ok(())
    }

    /// Look up a parser by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedParser> {
        self.parsers
            .read()
            .expect("parser registry poisoned")
            .iter()
            .find(|p| p.name() == name)
            .map(Arc::clone)
    }

    /// The first registered parser whose `can_parse` accepts the text.
    #[must_use]
    pub fn auto_detect(&self, text: &str) -> Option<SharedParser> {
        self.parsers
            .read()
            .expect("parser registry poisoned")
            .iter()
            .find(|p| p.can_parse(text))
            .map(Arc::clone)
    }

    /// Parser names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.parsers
            .read()
            .expect("parser registry poisoned")
            .iter()
            .map(|p| p.name())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn registry_preserves_registration_order() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.names(), ["json", "xml", "yaml"]);
    }

    #[test]
    fn duplicate_parser_name_is_rejected() {
        let registry = ParserRegistry::with_defaults();
        let err = registry
            .register(Arc::new(super::super::json::JsonParser))
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Configuration);
    }

    #[test]
    fn auto_detect_precedence_is_json_xml_yaml() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.auto_detect("{\"a\": 1}").unwrap().name(), "json");
        assert_eq!(registry.auto_detect("<a>1</a>").unwrap().name(), "xml");
        assert_eq!(registry.auto_detect("a: 1").unwrap().name(), "yaml");
        assert!(registry.auto_detect("just words").is_none());
    }

    #[test]
    fn parse_error_converts_to_typed_error() {
        let err: AgentError = ParseError::Unrecoverable {
            format: "json",
            attempts: 4,
            message: "eof".into(),
        }
        .into();
        assert_eq!(err.code, crate::error::ErrorCode::ParseUnrecoverable);
        assert!(!err.retryable);
    }
}
