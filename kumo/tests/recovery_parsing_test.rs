//! End-to-end tests of recovery strategies and the output pipeline.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use kumo::output::{DataFormat, FormatConverter, JsonParser, ParseOutcome};
use kumo::prelude::*;
use kumo::recovery::CircuitState;
use serde_json::json;

/// S5: markdown-wrapped JSON with a trailing comma parses after at least
/// two recovery attempts.
#[test]
fn json_recovery_from_markdown_and_trailing_comma() {
    let parser = ParserRegistry::global().get("json").unwrap();
    let text = "Here's the data:\n```json\n{\"a\": 1, \"b\": 2,}\n```\n";
    let ParseOutcome {
        value,
        attempts,
        recovered_by,
    } = parser
        .parse_with_recovery(text, &RecoveryOptions::lenient())
        .unwrap();

    assert_eq!(value, json!({"a": 1, "b": 2}));
    assert!(attempts - 1 >= 2, "recovery_attempts was {}", attempts - 1);
    assert_eq!(recovered_by, "common_fixes");
}

/// Auto-detection walks the registry in registration order: JSON, then
/// XML, then YAML.
#[test]
fn auto_detect_precedence() {
    let registry = ParserRegistry::global();
    assert_eq!(registry.auto_detect(r#"{"k": 1}"#).unwrap().name(), "json");
    assert_eq!(registry.auto_detect("<k>1</k>").unwrap().name(), "xml");
    assert_eq!(registry.auto_detect("k: 1").unwrap().name(), "yaml");
}

/// Schema round-trip: any value validating against a schema still
/// validates after serialize, parse, validate.
#[test]
fn schema_round_trip_holds() {
    let schema = OutputSchema::object()
        .with_required_property("name", OutputSchema::string())
        .with_required_property(
            "scores",
            OutputSchema::array(OutputSchema::number()).with_items_range(Some(1), None),
        )
        .with_property("nickname", OutputSchema::string());

    let value = json!({"name": "Ada", "scores": [1.5, 2.0, 3.25], "nickname": "countess"});
    assert!(SchemaValidator::validate(&value, &schema).valid);

    let serialized = serde_json::to_string(&value).unwrap();
    let reparsed = JsonParser.parse(&serialized).unwrap();
    let report = SchemaValidator::validate(&reparsed, &schema);
    assert!(report.valid, "{}", report.summary());
    assert_eq!(reparsed, value);
}

/// Validation through the parser surface: parse_with_schema rejects
/// values that parse but violate the schema.
#[test]
fn parse_with_schema_validates_the_result() {
    let schema = OutputSchema::object()
        .with_required_property("count", OutputSchema::integer());
    let parser = JsonParser;

    assert_eq!(
        parser.parse_with_schema(r#"{"count": 3}"#, &schema).unwrap(),
        json!({"count": 3})
    );
    let err = parser
        .parse_with_schema(r#"{"count": "three"}"#, &schema)
        .unwrap_err();
    assert!(err.to_string().contains("count"));
}

/// Cross-format conversion composes with parsing: YAML in, JSON out.
#[test]
fn convert_yaml_to_json_via_neutral_tree() {
    let converter = FormatConverter::new();
    let json_text = converter
        .convert("name: Ada\nactive: true\n", DataFormat::Yaml, DataFormat::Json)
        .unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&json_text).unwrap(),
        json!({"name": "Ada", "active": true})
    );
}

/// S6: the circuit breaker walks closed, open, half-open, closed.
#[tokio::test]
async fn circuit_breaker_full_cycle() {
    let breaker = CircuitBreaker::new(3, Duration::from_millis(100));

    // Three consecutive failures open the circuit, no earlier.
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    // Calls during open are rejected with circuit.open.
    let err = breaker.try_acquire().unwrap_err();
    assert_eq!(err.code, ErrorCode::CircuitOpen);
    assert!(err.retryable);

    // After the reset timeout a probe is admitted.
    tokio::time::sleep(Duration::from_millis(101)).await;
    assert!(breaker.try_acquire().is_ok());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    // Probe success closes the circuit.
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Composite strategies honor retryability and sum their attempts.
#[test]
fn composite_strategy_spans_children() {
    use kumo::recovery::{CompositeStrategy, ExponentialBackoff, NoRetry, RecoveryStrategy};
    use std::sync::Arc;

    let composite = CompositeStrategy::new(vec![
        Arc::new(NoRetry),
        Arc::new(ExponentialBackoff::new(
            2,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )),
    ]);
    assert_eq!(composite.max_attempts(), 3);
    assert!(composite.can_recover(&AgentError::tool_execution("t", "x")));
    assert!(!composite.can_recover(&AgentError::tool_not_found("t")));
}

/// Exponential backoff boundary: attempt zero waits nothing.
#[test]
fn exponential_backoff_attempt_zero_is_free() {
    use kumo::recovery::{ExponentialBackoff, RecoveryStrategy};
    let strategy = ExponentialBackoff::new(5, Duration::from_millis(100), Duration::from_secs(5));
    assert_eq!(strategy.delay_for(0), Duration::ZERO);
}

/// The error aggregator merges parallel failures into one typed error
/// that lists every contributor.
#[test]
fn aggregated_errors_serialize_contributors() {
    let aggregator = ErrorAggregator::new();
    aggregator.add(AgentError::tool_execution("fetch", "reset").with_context("attempt", json!(2)));
    aggregator.add(AgentError::tool_timeout("slow"));

    let merged = aggregator
        .into_error(ErrorCode::WorkflowChildFailed, "2 children failed")
        .unwrap();
    // Both contributors are retryable, so the merge is too.
    assert!(merged.retryable);
    let wire = merged.to_json();
    let contributors = wire["context"]["errors"].as_array().unwrap();
    assert_eq!(contributors.len(), 2);
    assert_eq!(contributors[0]["context"]["attempt"], json!(2));
}
