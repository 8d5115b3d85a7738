//! Recovery options and the text transforms shared across parsers.

use std::sync::LazyLock;

use regex::Regex;

use super::schema::OutputSchema;

/// Options controlling [`parse_with_recovery`](super::OutputParser::parse_with_recovery).
#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    /// Try extracting content from markdown code fences.
    pub extract_from_markdown: bool,
    /// Apply format-specific common-issue fixes.
    pub fix_common_issues: bool,
    /// Skip all recovery; only the verbatim parse is attempted.
    pub strict_mode: bool,
    /// Upper bound on parse attempts across all stages.
    pub max_attempts: usize,
    /// Schema used for the final structural-hinting stage and for
    /// [`parse_with_schema`](super::OutputParser::parse_with_schema).
    pub schema: Option<OutputSchema>,
}

impl RecoveryOptions {
    /// The defaults: full recovery with up to 6 attempts.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            extract_from_markdown: true,
            fix_common_issues: true,
            strict_mode: false,
            max_attempts: 6,
            schema: None,
        }
    }

    /// Verbatim parsing only.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            extract_from_markdown: false,
            fix_common_issues: false,
            strict_mode: true,
            max_attempts: 1,
            schema: None,
        }
    }

    /// Attach a schema for structural hinting and validation.
    #[must_use]
    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Override the attempt cap.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:[A-Za-z0-9_+-]*)[ \t]*\r?\n([\s\S]*?)```").expect("static regex is valid")
});

/// Extract the first markdown code fence's body, preferring a fence whose
/// info string names `language` when one exists.
#[must_use]
pub fn extract_markdown_fence(text: &str, language: &str) -> Option<String> {
    let labelled = Regex::new(&format!(
        r"```{}[ \t]*\r?\n([\s\S]*?)```",
        regex::escape(language)
    ))
    .ok()?;
    if let Some(captures) = labelled.captures(text) {
        return Some(captures[1].trim().to_string());
    }
    FENCE
        .captures(text)
        .map(|captures| captures[1].trim().to_string())
}

/// Strip a UTF-8 BOM and ASCII control characters (except `\n`, `\r`,
/// `\t`), and trim surrounding whitespace.
#[must_use]
pub fn strip_noise(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Extract the span between the first occurrence of `open` and the last
/// occurrence of `close`, inclusive.
#[must_use]
pub fn extract_delimited(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| text[start..=end].to_string())
}
