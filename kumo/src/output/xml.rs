//! XML parsing with recovery.
//!
//! Documents are read into the neutral tree: attributes become `@name`
//! keys, repeated child elements collapse into arrays, text-only elements
//! become strings, and mixed content keeps its text under `#text`. The
//! result is wrapped in an object keyed by the root element name.

use std::sync::LazyLock;

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use regex::Regex;
use serde_json::{Map, Value};

use super::parser::{OutputParser, ParseError};
use super::recovery::{extract_delimited, strip_noise};

/// The XML parser.
#[derive(Debug, Clone)]
pub struct XmlParser {
    /// Element name used when wrapping multiple roots.
    root_name: String,
}

impl Default for XmlParser {
    fn default() -> Self {
        Self {
            root_name: "root".to_string(),
        }
    }
}

impl XmlParser {
    /// Use a custom wrapping root element name.
    #[must_use]
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }
}

/// One element being assembled during the event walk.
struct PartialElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<(String, Value)>,
    text: String,
}

impl PartialElement {
    fn new(name: String) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> (String, Value) {
        let text = self.text.trim().to_string();
        if self.attributes.is_empty() && self.children.is_empty() {
            let value = if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            };
            return (self.name, value);
        }

        let mut map = Map::new();
        for (key, value) in self.attributes {
            map.insert(format!("@{key}"), Value::String(value));
        }
        for (key, value) in self.children {
            match map.get_mut(&key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    map.insert(key, Value::Array(vec![first, value]));
                }
                None => {
                    map.insert(key, value);
                }
            }
        }
        if !text.is_empty() {
            map.insert("#text".to_string(), Value::String(text));
        }
        (self.name, Value::Object(map))
    }
}

fn syntax(message: impl std::fmt::Display) -> ParseError {
    ParseError::Syntax {
        format: "xml",
        message: message.to_string(),
    }
}

fn read_attributes(
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<Vec<(String, String)>, ParseError> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(syntax)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
        let value = attribute.unescape_value().map_err(syntax)?.to_string();
        attributes.push((key, value));
    }
    Ok(attributes)
}

impl OutputParser for XmlParser {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn can_parse(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.starts_with('<') && trimmed.ends_with('>')
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        let mut reader = Reader::from_str(text.trim());
        let mut stack: Vec<PartialElement> = Vec::new();
        let mut roots: Vec<(String, Value)> = Vec::new();

        loop {
            match reader.read_event().map_err(syntax)? {
                XmlEvent::Start(start) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                    let mut element = PartialElement::new(name);
                    element.attributes = read_attributes(&start)?;
                    stack.push(element);
                }
                XmlEvent::Empty(start) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                    let mut element = PartialElement::new(name);
                    element.attributes = read_attributes(&start)?;
                    let entry = element.into_value();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(entry),
                        None => roots.push(entry),
                    }
                }
                XmlEvent::End(_) => {
                    let element = stack.pop().ok_or_else(|| syntax("unmatched closing tag"))?;
                    let entry = element.into_value();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(entry),
                        None => roots.push(entry),
                    }
                }
                XmlEvent::Text(t) => {
                    let text = t.decode().map_err(syntax)?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    } else if !text.trim().is_empty() {
                        return Err(syntax("text outside the root element"));
                    }
                }
                XmlEvent::CData(data) => {
                    let text = String::from_utf8_lossy(&data).to_string();
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                XmlEvent::Eof => break,
                _ => {} // declarations, comments, processing instructions
            }
        }

        if !stack.is_empty() {
            return Err(syntax(format!("unclosed element '{}'", stack[stack.len() - 1].name)));
        }
        match roots.len() {
            0 => Err(syntax("no root element")),
            1 => {
                let (name, value) = roots.remove(0);
                let mut map = Map::new();
                map.insert(name, value);
                Ok(Value::Object(map))
            }
            _ => Err(syntax("multiple root elements")),
        }
    }

    fn cleanup(&self, text: &str) -> String {
        strip_noise(text)
    }

    fn fix_common_issues(&self, text: &str) -> String {
        let quoted = quote_bare_attributes(text);
        let closed = close_unclosed_tags(&quoted);
        if count_roots(&closed) > 1 {
            format!("<{0}>{closed}</{0}>", self.root_name)
        } else {
            closed
        }
    }

    fn extract_block(&self, text: &str) -> Option<String> {
        extract_delimited(text, '<', '>')
    }
}

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([A-Za-z_][A-Za-z0-9_.:-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("static regex is valid")
});

static BARE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\s[A-Za-z_:][A-Za-z0-9_:.-]*)=([^\s"'>][^\s>]*)"#).expect("static regex is valid")
});

/// Insert missing attribute quotes inside tags: `<a id=1>` → `<a id="1">`.
fn quote_bare_attributes(text: &str) -> String {
    TAG.replace_all(text, |captures: &regex::Captures<'_>| {
        let attrs = BARE_ATTR.replace_all(&captures[3], "$1=\"$2\"");
        format!("<{}{}{}{}>", &captures[1], &captures[2], attrs, &captures[4])
    })
    .into_owned()
}

/// Append closing tags for elements left open at the end of the text.
fn close_unclosed_tags(text: &str) -> String {
    let mut stack: Vec<String> = Vec::new();
    for captures in TAG.captures_iter(text) {
        let closing = !captures[1].is_empty();
        let self_closing = !captures[4].is_empty();
        let name = captures[2].to_string();
        if closing {
            if let Some(position) = stack.iter().rposition(|open| *open == name) {
                stack.truncate(position);
            }
        } else if !self_closing {
            stack.push(name);
        }
    }
    if stack.is_empty() {
        return text.to_string();
    }
    let mut out = text.trim_end().to_string();
    for name in stack.iter().rev() {
        out.push_str(&format!("</{name}>"));
    }
    out
}

/// Count elements that open at nesting depth zero.
fn count_roots(text: &str) -> usize {
    let mut depth = 0usize;
    let mut roots = 0usize;
    for captures in TAG.captures_iter(text) {
        let closing = !captures[1].is_empty();
        let self_closing = !captures[4].is_empty();
        if closing {
            depth = depth.saturating_sub(1);
        } else {
            if depth == 0 {
                roots += 1;
            }
            if !self_closing {
                depth += 1;
            }
        }
    }
    roots
}
