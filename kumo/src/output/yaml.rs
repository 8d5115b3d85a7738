//! YAML parsing with recovery.

use serde_json::Value;

use super::parser::{OutputParser, ParseError};
use super::recovery::strip_noise;

/// The YAML parser.
///
/// Only mapping and sequence documents are accepted: almost any text is a
/// valid YAML scalar, so admitting scalars would make every recovery stage
/// trivially "succeed" on prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

fn syntax(message: impl std::fmt::Display) -> ParseError {
    ParseError::Syntax {
        format: "yaml",
        message: message.to_string(),
    }
}

impl OutputParser for YamlParser {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn can_parse(&self, text: &str) -> bool {
        has_top_level_colon(text) && self.parse(text).is_ok()
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        let parsed: serde_yaml::Value = serde_yaml::from_str(text).map_err(syntax)?;
        if !matches!(
            parsed,
            serde_yaml::Value::Mapping(_) | serde_yaml::Value::Sequence(_)
        ) {
            return Err(syntax("not a mapping or sequence document"));
        }
        serde_json::to_value(parsed).map_err(syntax)
    }

    fn cleanup(&self, text: &str) -> String {
        // YAML forbids tabs in indentation; models emit them anyway.
        strip_noise(text).replace('\t', "  ")
    }

    fn fix_common_issues(&self, text: &str) -> String {
        dedent(text)
    }

    fn extract_block(&self, text: &str) -> Option<String> {
        // Cut the document between `---` and `...` markers.
        let mut lines = text.lines();
        let mut body: Vec<&str> = Vec::new();
        let mut started = false;
        for line in lines.by_ref() {
            let trimmed = line.trim();
            if !started {
                if trimmed == "---" {
                    started = true;
                }
                continue;
            }
            if trimmed == "..." || trimmed == "---" {
                break;
            }
            body.push(line);
        }
        started.then(|| body.join("\n"))
    }
}

/// Whether a `:` appears outside `{}`/`[]` flow collections.
fn has_top_level_colon(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Strip the indentation common to every non-empty line.
fn dedent(text: &str) -> String {
    let common = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);
    if common == 0 {
        return text.to_string();
    }
    text.lines()
        .map(|line| if line.len() >= common { &line[common..] } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::output::recovery::RecoveryOptions;
    use serde_json::json;

    #[test]
    fn parses_mappings_and_sequences() {
        let parser = YamlParser;
        assert_eq!(
            parser.parse("name: Ada\nskills:\n  - math\n  - code\n").unwrap(),
            json!({"name": "Ada", "skills": ["math", "code"]})
        );
        assert_eq!(parser.parse("- 1\n- 2\n").unwrap(), json!([1, 2]));
    }

    #[test]
    fn rejects_bare_scalars() {
        let parser = YamlParser;
        assert!(parser.parse("just a sentence").is_err());
    }

    #[test]
    fn can_parse_needs_a_colon_outside_flow() {
        let parser = YamlParser;
        assert!(parser.can_parse("a: 1"));
        assert!(!parser.can_parse("plain words"));
    }

    #[test]
    fn cleanup_replaces_tabs() {
        let parser = YamlParser;
        let fixed = parser.cleanup("a:\n\tb: 1");
        let value = parser.parse(&fixed).unwrap();
        assert_eq!(value, json!({"a": {"b": 1}}));
    }

    #[test]
    fn dedent_normalizes_uniform_indentation() {
        let text = "    a: 1\n    b: 2";
        assert_eq!(dedent(text), "a: 1\nb: 2");
    }

    #[test]
    fn recovery_extracts_document_markers() {
        let parser = YamlParser;
        let text = "preamble\n---\na: 1\nb: 2\n...\ntrailing prose";
        let outcome = parser
            .parse_with_recovery(text, &RecoveryOptions::lenient())
            .unwrap();
        assert_eq!(outcome.value, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn recovery_handles_markdown_fenced_yaml() {
        let parser = YamlParser;
        let text = "Here you go:\n```yaml\nname: widget\ncount: 3\n```";
        let outcome = parser
            .parse_with_recovery(text, &RecoveryOptions::lenient())
            .unwrap();
        assert_eq!(outcome.value, json!({"name": "widget", "count": 3}));
    }
}
