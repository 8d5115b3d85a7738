//! Structured-output pipeline.
//!
//! Format-agnostic parsing of model output with multi-strategy recovery,
//! schema validation, and cross-format conversion. The parsers share one
//! recovery pipeline (verbatim, markdown fences, cleanup, common fixes,
//! block extraction, schema hinting) and register in a process-wide,
//! insertion-ordered registry that backs `auto_detect`.

mod converter;
mod json;
mod parser;
mod recovery;
mod schema;
mod validator;
mod xml;
mod yaml;

pub use converter::{ConvertOptions, DataFormat, FormatConverter};
pub use json::JsonParser;
pub use parser::{
    OutputParser, ParseError, ParseOutcome, ParserRegistry, ParserState, SharedParser,
};
pub use recovery::RecoveryOptions;
pub use schema::{OutputSchema, SchemaType};
pub use validator::{
    FixSuggestion, SchemaValidator, ValidationIssue, ValidationReport, ValidationWarning,
};
pub use xml::XmlParser;
pub use yaml::YamlParser;
