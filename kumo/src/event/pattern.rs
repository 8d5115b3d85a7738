//! Dot-segment glob patterns for event types.
//!
//! Patterns match on an event's `type` field, with segments delimited by
//! `.`: `*` matches exactly one segment, `**` matches any number of
//! segments (including none). `tool.*.retry` matches `tool.fetch.retry`
//! but not `tool.retry`; `tool.**` matches both.

use std::fmt;

/// One parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Many,
}

/// A compiled dot-segment glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl EventPattern {
    /// Compile a pattern.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let segments = raw
            .split('.')
            .map(|seg| match seg {
                "*" => Segment::One,
                "**" => Segment::Many,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        Self { raw, segments }
    }

    /// The pattern source text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcards.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Number of wildcard segments. Fewer wildcards means more specific;
    /// delivery orders more-specific patterns first.
    #[must_use]
    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Whether the pattern matches an event type.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        let parts: Vec<&str> = event_type.split('.').collect();
        Self::match_segments(&self.segments, &parts)
    }

    fn match_segments(pattern: &[Segment], parts: &[&str]) -> bool {
        match pattern.first() {
            None => parts.is_empty(),
            Some(Segment::Literal(lit)) => parts
                .first()
                .is_some_and(|p| p == lit && Self::match_segments(&pattern[1..], &parts[1..])),
            Some(Segment::One) => {
                !parts.is_empty() && Self::match_segments(&pattern[1..], &parts[1..])
            }
            Some(Segment::Many) => {
                // Try consuming zero segments, then one, then two, …
                (0..=parts.len()).any(|n| Self::match_segments(&pattern[1..], &parts[n..]))
            }
        }
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for EventPattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}
