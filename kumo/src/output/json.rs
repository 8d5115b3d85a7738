//! JSON parsing with recovery.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::parser::{OutputParser, ParseError};
use super::recovery::{extract_delimited, strip_noise};
use super::schema::{OutputSchema, SchemaType};

/// The JSON parser.
///
/// Common-issue fixes target the mistakes models actually make: trailing
/// commas, single-quoted strings, and unquoted object keys. All fixes are
/// character scans that respect string boundaries; a regex over the whole
/// text would mangle string contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl OutputParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn can_parse(&self, text: &str) -> bool {
        let trimmed = text.trim_start();
        (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<Value>(text.trim()).is_ok()
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        serde_json::from_str(text.trim()).map_err(|e| ParseError::Syntax {
            format: "json",
            message: e.to_string(),
        })
    }

    fn cleanup(&self, text: &str) -> String {
        strip_noise(text)
    }

    fn fix_common_issues(&self, text: &str) -> String {
        let singles_fixed = replace_single_quotes(text);
        let keys_fixed = quote_unquoted_keys(&singles_fixed);
        remove_trailing_commas(&keys_fixed)
    }

    fn extract_block(&self, text: &str) -> Option<String> {
        // Prefer an object block; fall back to an array block.
        extract_delimited(text, '{', '}').or_else(|| extract_delimited(text, '[', ']'))
    }

    fn synthesize_with_schema(&self, text: &str, schema: &OutputSchema) -> Option<Value> {
        match schema.schema_type {
            // Scavenge `"key": scalar` pairs for the properties the schema
            // names, even when the enclosing object is broken.
            SchemaType::Object => {
                let mut object = Map::new();
                for name in schema.properties.keys() {
                    if let Some(value) = scavenge_property(text, name) {
                        object.insert(name.clone(), value);
                    }
                }
                (!object.is_empty()).then_some(Value::Object(object))
            }
            // A string schema accepts the raw text itself.
            SchemaType::String => Some(Value::String(text.trim().to_string())),
            _ => None,
        }
    }
}

/// Find `"name": <scalar>` in broken JSON text.
fn scavenge_property(text: &str, name: &str) -> Option<Value> {
    static SCALAR: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""(?P<key>[^"]+)"\s*:\s*(?P<value>"(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|true|false|null)"#)
            .expect("static regex is valid")
    });
    SCALAR.captures_iter(text).find_map(|captures| {
        (&captures["key"] == name)
            .then(|| serde_json::from_str(&captures["value"]).ok())
            .flatten()
    })
}

/// Replace single-quoted strings with double-quoted ones, leaving
/// apostrophes inside double-quoted strings alone.
fn replace_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_double = false;
    let mut in_single = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_double || in_single => {
                // Preserve escapes, except `\'` which double quotes don't need.
                if in_single && chars.peek() == Some(&'\'') {
                    out.push(chars.next().unwrap_or('\''));
                } else {
                    out.push(c);
                    escaped = true;
                }
            }
            '"' if in_single => out.push_str("\\\""),
            '"' => {
                in_double = !in_double;
                out.push('"');
            }
            '\'' if !in_double => {
                in_single = !in_single;
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Quote bare object keys: `{key: 1}` → `{"key": 1}`.
fn quote_unquoted_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;
    // A bare key can only follow `{` or `,` (modulo whitespace).
    let mut expecting_key = false;

    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                expecting_key = false;
                out.push(c);
                i += 1;
            }
            '{' | ',' => {
                expecting_key = true;
                out.push(c);
                i += 1;
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            c if expecting_key && (c.is_alphabetic() || c == '_') => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                    i += 1;
                }
                let mut j = i;
                while j < bytes.len() && bytes[j].is_whitespace() {
                    j += 1;
                }
                let word: String = bytes[start..i].iter().collect();
                if bytes.get(j) == Some(&':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
                expecting_key = false;
            }
            _ => {
                expecting_key = false;
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Remove commas that directly precede a closing brace or bracket.
fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::output::recovery::RecoveryOptions;
    use serde_json::json;

    #[test]
    fn can_parse_requires_json_shape() {
        let parser = JsonParser;
        assert!(parser.can_parse("{\"a\": 1}"));
        assert!(parser.can_parse("  [1, 2]"));
        assert!(!parser.can_parse("a: 1"));
        assert!(!parser.can_parse("{broken"));
    }

    #[test]
    fn fixes_trailing_commas() {
        assert_eq!(
            remove_trailing_commas("{\"a\": 1, \"b\": [1, 2,],}"),
            "{\"a\": 1, \"b\": [1, 2]}"
        );
        // Commas inside strings survive.
        assert_eq!(
            remove_trailing_commas("{\"a\": \"x,}\"}"),
            "{\"a\": \"x,}\"}"
        );
    }

    #[test]
    fn fixes_single_quotes() {
        assert_eq!(
            replace_single_quotes("{'a': 'it\\'s'}"),
            "{\"a\": \"it's\"}"
        );
        // Apostrophes inside double-quoted strings are untouched.
        assert_eq!(
            replace_single_quotes("{\"a\": \"it's\"}"),
            "{\"a\": \"it's\"}"
        );
    }

    #[test]
    fn fixes_unquoted_keys() {
        assert_eq!(
            quote_unquoted_keys("{a: 1, nested_key: {b: 2}}"),
            "{\"a\": 1, \"nested_key\": {\"b\": 2}}"
        );
        // Bare words in values stay bare.
        assert_eq!(quote_unquoted_keys("{\"a\": true}"), "{\"a\": true}");
    }

    #[test]
    fn recovery_handles_markdown_wrapped_trailing_comma() {
        let parser = JsonParser;
        let text = "Here's the data:\n```json\n{\"a\": 1, \"b\": 2,}\n```\n";
        let outcome = parser
            .parse_with_recovery(text, &RecoveryOptions::lenient())
            .unwrap();
        assert_eq!(outcome.value, json!({"a": 1, "b": 2}));
        assert!(outcome.recovery_attempts() >= 2);
    }

    #[test]
    fn recovery_extracts_object_from_prose() {
        let parser = JsonParser;
        let text = "The result is {\"ok\": true} as requested.";
        let outcome = parser
            .parse_with_recovery(text, &RecoveryOptions::lenient())
            .unwrap();
        assert_eq!(outcome.value, json!({"ok": true}));
    }

    #[test]
    fn strict_mode_skips_recovery() {
        let parser = JsonParser;
        let err = parser
            .parse_with_recovery("{\"a\": 1,}", &RecoveryOptions::strict())
            .unwrap_err();
        assert!(matches!(err, ParseError::Unrecoverable { attempts: 1, .. }));
    }

    #[test]
    fn monotonic_in_max_attempts() {
        let parser = JsonParser;
        let text = "```json\n{\"a\": 1,}\n```";
        let succeeded_at = (1..=6)
            .find(|&k| {
                parser
                    .parse_with_recovery(
                        text,
                        &RecoveryOptions::lenient().with_max_attempts(k),
                    )
                    .is_ok()
            })
            .unwrap();
        // Every larger budget must also succeed.
        for k in succeeded_at..=8 {
            assert!(
                parser
                    .parse_with_recovery(text, &RecoveryOptions::lenient().with_max_attempts(k))
                    .is_ok(),
                "failed at max_attempts={k}"
            );
        }
    }

    #[test]
    fn schema_hint_scavenges_named_properties() {
        let parser = JsonParser;
        let schema = OutputSchema::object()
            .with_required_property("name", OutputSchema::string())
            .with_required_property("count", OutputSchema::integer());
        // Hopelessly broken nesting, but the pairs are visible.
        let text = "{{\"name\": \"widget\" ... \"count\": 42 ...";
        let outcome = parser
            .parse_with_recovery(
                text,
                &RecoveryOptions::lenient().with_schema(schema),
            )
            .unwrap();
        assert_eq!(outcome.recovered_by, "schema_hint");
        assert_eq!(outcome.value, json!({"name": "widget", "count": 42}));
    }
}
