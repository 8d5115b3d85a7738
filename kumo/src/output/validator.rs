//! Schema validation over parsed values.
//!
//! The validator walks an [`OutputSchema`] against a value, accumulating
//! errors, warnings, and fix suggestions rather than stopping at the first
//! problem. Paths use the JSON-path-ish `$.a.b[3].c` syntax.

use regex::Regex;
use serde_json::Value;

use super::schema::{OutputSchema, SchemaType};

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Where in the value the problem is (`$.items[2].name`).
    pub path: String,
    /// The leaf field name, when applicable.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable issue code.
    pub code: String,
    /// What the schema wanted.
    pub expected: Option<String>,
    /// What the value provided.
    pub actual: Option<String>,
}

/// A non-fatal observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Where in the value the observation is.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

/// A canonical fix for an issue, when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixSuggestion {
    /// The path the suggestion applies to.
    pub path: String,
    /// What to do.
    pub suggestion: String,
}

/// The accumulated result of a validation walk.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Whether no errors were found.
    pub valid: bool,
    /// Errors, in walk order.
    pub errors: Vec<ValidationIssue>,
    /// Warnings, in walk order.
    pub warnings: Vec<ValidationWarning>,
    /// Fix suggestions paired with errors.
    pub suggestions: Vec<FixSuggestion>,
}

impl ValidationReport {
    /// One-line summary of the errors.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.valid {
            return "valid".to_string();
        }
        let details: Vec<String> = self
            .errors
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect();
        format!("{} error(s): {}", self.errors.len(), details.join("; "))
    }
}

/// Walks values against schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate `value` against `schema`.
    #[must_use]
    pub fn validate(value: &Value, schema: &OutputSchema) -> ValidationReport {
        let mut report = ValidationReport::default();
        walk(value, schema, "$", "", &mut report);
        report.valid = report.errors.is_empty();
        report
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coercion rules: an integer schema accepts any integer-valued number; a
/// number schema accepts both integer and float representations.
fn type_matches(value: &Value, schema_type: SchemaType) -> bool {
    match schema_type {
        SchemaType::String => value.is_string(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Null => value.is_null(),
        SchemaType::Array => value.is_array(),
        SchemaType::Object => value.is_object(),
        SchemaType::Number => value.is_number(),
        SchemaType::Integer => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
    }
}

fn push_error(
    report: &mut ValidationReport,
    path: &str,
    field: &str,
    code: &str,
    message: String,
    expected: Option<String>,
    actual: Option<String>,
    suggestion: Option<String>,
) {
    if let Some(suggestion) = suggestion {
        report.suggestions.push(FixSuggestion {
            path: path.to_string(),
            suggestion,
        });
    }
    report.errors.push(ValidationIssue {
        path: path.to_string(),
        field: field.to_string(),
        message,
        code: code.to_string(),
        expected,
        actual,
    });
}

#[allow(clippy::too_many_lines)]
fn walk(value: &Value, schema: &OutputSchema, path: &str, field: &str, report: &mut ValidationReport) {
    if !type_matches(value, schema.schema_type) {
        let expected = schema.schema_type.as_str();
        let actual = type_name(value);
        push_error(
            report,
            path,
            field,
            "type_mismatch",
            format!("expected {expected}, found {actual}"),
            Some(expected.to_string()),
            Some(actual.to_string()),
            Some(format!("convert the {actual} to {expected}")),
        );
        return;
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            push_error(
                report,
                path,
                field,
                "enum_mismatch",
                format!("value {value} is not one of the permitted values"),
                Some(options.join(", ")),
                Some(value.to_string()),
                Some(format!("use one of: {}", options.join(", "))),
            );
        }
    }

    match value {
        Value::String(text) => {
            if let Some(pattern) = &schema.pattern {
                match Regex::new(pattern) {
                    Ok(regex) => {
                        if !regex.is_match(text) {
                            push_error(
                                report,
                                path,
                                field,
                                "pattern_mismatch",
                                format!("string does not match pattern '{pattern}'"),
                                Some(pattern.clone()),
                                Some(text.clone()),
                                None,
                            );
                        }
                    }
                    Err(_) => report.warnings.push(ValidationWarning {
                        path: path.to_string(),
                        message: format!("unusable pattern '{pattern}' in schema"),
                    }),
                }
            }
            if let Some(format) = &schema.format {
                if let Some((message, suggestion)) = check_format(format, text) {
                    push_error(
                        report,
                        path,
                        field,
                        "format_invalid",
                        message,
                        Some(format.clone()),
                        Some(text.clone()),
                        Some(suggestion),
                    );
                }
            }
        }
        Value::Number(number) => {
            let candidate = number.as_f64().unwrap_or_default();
            if schema.minimum.is_some_and(|min| candidate < min)
                || schema.maximum.is_some_and(|max| candidate > max)
            {
                let range = format!(
                    "[{}, {}]",
                    schema.minimum.map_or("-inf".to_string(), |m| m.to_string()),
                    schema.maximum.map_or("inf".to_string(), |m| m.to_string()),
                );
                push_error(
                    report,
                    path,
                    field,
                    "out_of_range",
                    format!("{candidate} is outside {range}"),
                    Some(range),
                    Some(candidate.to_string()),
                    None,
                );
            }
        }
        Value::Array(items) => {
            if schema.min_items.is_some_and(|min| items.len() < min) {
                push_error(
                    report,
                    path,
                    field,
                    "too_few_items",
                    format!(
                        "array has {} items, needs at least {}",
                        items.len(),
                        schema.min_items.unwrap_or_default()
                    ),
                    schema.min_items.map(|m| m.to_string()),
                    Some(items.len().to_string()),
                    None,
                );
            }
            if schema.max_items.is_some_and(|max| items.len() > max) {
                push_error(
                    report,
                    path,
                    field,
                    "too_many_items",
                    format!(
                        "array has {} items, allows at most {}",
                        items.len(),
                        schema.max_items.unwrap_or_default()
                    ),
                    schema.max_items.map(|m| m.to_string()),
                    Some(items.len().to_string()),
                    None,
                );
            }
            if let Some(item_schema) = &schema.items {
                for (index, item) in items.iter().enumerate() {
                    let child_path = format!("{path}[{index}]");
                    walk(item, item_schema, &child_path, field, report);
                }
            }
        }
        Value::Object(map) => {
            for required in &schema.required {
                if !map.contains_key(required) {
                    let child_path = format!("{path}.{required}");
                    push_error(
                        report,
                        &child_path,
                        required,
                        "missing_property",
                        format!("required property '{required}' is missing"),
                        Some(required.clone()),
                        None,
                        Some(format!("add the '{required}' property")),
                    );
                }
            }
            for (key, child) in map {
                if let Some(child_schema) = schema.properties.get(key) {
                    let child_path = format!("{path}.{key}");
                    walk(child, child_schema, &child_path, key, report);
                } else if schema.additional_properties == Some(false) {
                    let child_path = format!("{path}.{key}");
                    push_error(
                        report,
                        &child_path,
                        key,
                        "additional_property",
                        format!("property '{key}' is not permitted"),
                        None,
                        Some(key.clone()),
                        Some(format!("remove the '{key}' property")),
                    );
                } else {
                    report.warnings.push(ValidationWarning {
                        path: format!("{path}.{key}"),
                        message: format!("property '{key}' is not described by the schema"),
                    });
                }
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

/// Structural format checks. Returns `(message, suggestion)` on failure.
fn check_format(format: &str, text: &str) -> Option<(String, String)> {
    let ok = match format {
        "email" => {
            let mut parts = text.splitn(2, '@');
            let local = parts.next().unwrap_or_default();
            let domain = parts.next().unwrap_or_default();
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        "date" => chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
        "time" => chrono::NaiveTime::parse_from_str(text, "%H:%M:%S").is_ok(),
        "date-time" => chrono::DateTime::parse_from_rfc3339(text).is_ok(),
        "uri" => {
            let mut chars = text.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && text.contains(':')
                && !text.contains(char::is_whitespace)
        }
        "uuid" => uuid::Uuid::parse_str(text).is_ok(),
        _ => return None, // unknown formats are not enforced
    };
    if ok {
        return None;
    }
    let example = match format {
        "email" => "user@example.com",
        "date" => "2026-01-31",
        "time" => "13:45:00",
        "date-time" => "2026-01-31T13:45:00Z",
        "uri" => "https://example.com/path",
        "uuid" => "67e55044-10b1-426f-9247-bb680e5fe0c8",
        _ => "",
    };
    Some((
        format!("'{text}' is not a valid {format}"),
        format!("use the {format} form, e.g. {example}"),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> OutputSchema {
        OutputSchema::object()
            .with_required_property("name", OutputSchema::string())
            .with_required_property("age", OutputSchema::integer().with_range(Some(0.0), Some(150.0)))
            .with_property("email", OutputSchema::string().with_format("email"))
    }

    #[test]
    fn valid_value_passes() {
        let report = SchemaValidator::validate(
            &json!({"name": "Ada", "age": 36, "email": "ada@example.com"}),
            &person_schema(),
        );
        assert!(report.valid, "{}", report.summary());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn missing_required_property_is_reported_with_suggestion() {
        let report = SchemaValidator::validate(&json!({"age": 36}), &person_schema());
        assert!(!report.valid);
        let issue = &report.errors[0];
        assert_eq!(issue.code, "missing_property");
        assert_eq!(issue.path, "$.name");
        assert!(report.suggestions.iter().any(|s| s.suggestion.contains("name")));
    }

    #[test]
    fn integer_schema_accepts_integer_valued_floats() {
        let schema = OutputSchema::integer();
        assert!(SchemaValidator::validate(&json!(3.0), &schema).valid);
        assert!(!SchemaValidator::validate(&json!(3.5), &schema).valid);
        assert!(SchemaValidator::validate(&json!(3), &schema).valid);
    }

    #[test]
    fn number_schema_accepts_both_representations() {
        let schema = OutputSchema::number();
        assert!(SchemaValidator::validate(&json!(3), &schema).valid);
        assert!(SchemaValidator::validate(&json!(3.7), &schema).valid);
        assert!(!SchemaValidator::validate(&json!("3"), &schema).valid);
    }

    #[test]
    fn range_and_enum_checks() {
        let report = SchemaValidator::validate(&json!({"name": "Ada", "age": 200}), &person_schema());
        assert!(report.errors.iter().any(|e| e.code == "out_of_range"));

        let color = OutputSchema::string().with_enum(vec![json!("red"), json!("blue")]);
        let report = SchemaValidator::validate(&json!("green"), &color);
        assert_eq!(report.errors[0].code, "enum_mismatch");
        assert!(report.suggestions[0].suggestion.contains("red"));
    }

    #[test]
    fn nested_paths_use_json_path_syntax() {
        let schema = OutputSchema::object().with_required_property(
            "items",
            OutputSchema::array(
                OutputSchema::object().with_required_property("id", OutputSchema::integer()),
            ),
        );
        let report = SchemaValidator::validate(
            &json!({"items": [{"id": 1}, {"id": "two"}]}),
            &schema,
        );
        assert!(!report.valid);
        assert_eq!(report.errors[0].path, "$.items[1].id");
        assert_eq!(report.errors[0].code, "type_mismatch");
    }

    #[test]
    fn additional_properties_warn_unless_forbidden() {
        let lenient = person_schema();
        let report =
            SchemaValidator::validate(&json!({"name": "Ada", "age": 1, "extra": 1}), &lenient);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);

        let strict = lenient.with_additional_properties(false);
        let report =
            SchemaValidator::validate(&json!({"name": "Ada", "age": 1, "extra": 1}), &strict);
        assert!(!report.valid);
        assert_eq!(report.errors[0].code, "additional_property");
    }

    #[test]
    fn schema_with_no_declared_properties_still_warns() {
        // Every property is additional when the schema declares none.
        let bare = OutputSchema::object();
        let report = SchemaValidator::validate(&json!({"a": 1, "b": 2}), &bare);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.path == "$.a" && w.message.contains("'a'")));

        let forbidden = OutputSchema::object().with_additional_properties(false);
        let report = SchemaValidator::validate(&json!({"a": 1}), &forbidden);
        assert!(!report.valid);
        assert_eq!(report.errors[0].code, "additional_property");
    }

    #[test]
    fn format_checks_are_structural() {
        let email = OutputSchema::string().with_format("email");
        assert!(SchemaValidator::validate(&json!("a@b.co"), &email).valid);
        assert!(!SchemaValidator::validate(&json!("not-an-email"), &email).valid);

        let stamp = OutputSchema::string().with_format("date-time");
        assert!(SchemaValidator::validate(&json!("2026-01-31T13:45:00Z"), &stamp).valid);
        assert!(!SchemaValidator::validate(&json!("January 31st"), &stamp).valid);

        let id = OutputSchema::string().with_format("uuid");
        assert!(SchemaValidator::validate(&json!("67e55044-10b1-426f-9247-bb680e5fe0c8"), &id).valid);
        assert!(!SchemaValidator::validate(&json!("nope"), &id).valid);
    }

    #[test]
    fn array_length_bounds() {
        let schema = OutputSchema::array(OutputSchema::integer()).with_items_range(Some(2), Some(3));
        assert!(!SchemaValidator::validate(&json!([1]), &schema).valid);
        assert!(SchemaValidator::validate(&json!([1, 2]), &schema).valid);
        assert!(!SchemaValidator::validate(&json!([1, 2, 3, 4]), &schema).valid);
    }
}
