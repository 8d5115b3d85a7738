//! Cross-format conversion through the neutral tree.
//!
//! Conversion normalises the source document into a neutral
//! `serde_json::Value` tree (string/number/bool/null/sequence/mapping)
//! and re-emits it in the target format. XML attributes travel as `@name`
//! keys; a configurable root element wraps trees whose root is a sequence
//! or a bare mapping.

use serde_json::Value;

use super::json::JsonParser;
use super::parser::{OutputParser, ParseError};
use super::xml::XmlParser;
use super::yaml::YamlParser;

/// The formats the converter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// JSON.
    Json,
    /// XML.
    Xml,
    /// YAML.
    Yaml,
}

impl DataFormat {
    /// The format's parser name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Yaml => "yaml",
        }
    }
}

/// Conversion options.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Pretty-print the output (JSON indentation, XML line breaks).
    pub pretty: bool,
    /// Root element name used when the tree needs wrapping for XML.
    pub xml_root: String,
    /// YAML block indentation width.
    pub yaml_indent: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            xml_root: "root".to_string(),
            yaml_indent: 2,
        }
    }
}

/// Converts documents between JSON, XML, and YAML.
#[derive(Debug, Clone, Default)]
pub struct FormatConverter {
    options: ConvertOptions,
}

impl FormatConverter {
    /// A converter with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A converter with explicit options.
    #[must_use]
    pub const fn with_options(options: ConvertOptions) -> Self {
        Self { options }
    }

    /// Convert `text` from one format to another.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the source text is invalid or the
    /// tree cannot be represented in the target format.
    pub fn convert(
        &self,
        text: &str,
        from: DataFormat,
        to: DataFormat,
    ) -> Result<String, ParseError> {
        let neutral = self.to_neutral(text, from)?;
        self.emit(&neutral, to)
    }

    /// Parse `text` into the neutral tree.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the text is invalid in `format`.
    pub fn to_neutral(&self, text: &str, format: DataFormat) -> Result<Value, ParseError> {
        match format {
            DataFormat::Json => JsonParser.parse(text),
            DataFormat::Xml => XmlParser::default().parse(text),
            DataFormat::Yaml => YamlParser.parse(text),
        }
    }

    /// Emit the neutral tree in `format`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the tree cannot be serialized.
    pub fn emit(&self, value: &Value, format: DataFormat) -> Result<String, ParseError> {
        match format {
            DataFormat::Json => {
                let rendered = if self.options.pretty {
                    serde_json::to_string_pretty(value)
                } else {
                    serde_json::to_string(value)
                };
                rendered.map_err(|e| ParseError::Syntax {
                    format: "json",
                    message: e.to_string(),
                })
            }
            DataFormat::Yaml => {
                let rendered = serde_yaml::to_string(value).map_err(|e| ParseError::Syntax {
                    format: "yaml",
                    message: e.to_string(),
                })?;
                Ok(reindent_yaml(&rendered, self.options.yaml_indent))
            }
            DataFormat::Xml => Ok(self.emit_xml(value)),
        }
    }

    /// Render the tree as XML. A single-key mapping whose value is not a
    /// sequence provides the root element; anything else is wrapped in the
    /// configured root name.
    fn emit_xml(&self, value: &Value) -> String {
        let mut out = String::new();
        match value {
            Value::Object(map) if map.len() == 1 => {
                let (name, inner) = map.iter().next().expect("len checked");
                if inner.is_array() {
                    // <root><name>…</name><name>…</name></root>
                    write_element(&self.options.xml_root, value, &mut out, self.options.pretty, 0);
                } else {
                    write_element(name, inner, &mut out, self.options.pretty, 0);
                }
            }
            Value::Array(_) => {
                // A bare sequence becomes <root> with repeated <item> children.
                let wrapped = Value::Object(
                    std::iter::once(("item".to_string(), value.clone())).collect(),
                );
                write_element(&self.options.xml_root, &wrapped, &mut out, self.options.pretty, 0);
            }
            _ => write_element(&self.options.xml_root, value, &mut out, self.options.pretty, 0),
        }
        if self.options.pretty {
            out.truncate(out.trim_end().len());
        }
        out
    }
}

fn escape_xml(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn write_indent(out: &mut String, pretty: bool, depth: usize) {
    if pretty {
        for _ in 0..depth {
            out.push_str("  ");
        }
    }
}

fn write_newline(out: &mut String, pretty: bool) {
    if pretty {
        out.push('\n');
    }
}

fn write_element(name: &str, value: &Value, out: &mut String, pretty: bool, depth: usize) {
    match value {
        // A sequence repeats the element once per item.
        Value::Array(items) => {
            for item in items {
                write_element(name, item, out, pretty, depth);
            }
        }
        Value::Null => {
            write_indent(out, pretty, depth);
            out.push_str(&format!("<{name}/>"));
            write_newline(out, pretty);
        }
        Value::Object(map) => {
            write_indent(out, pretty, depth);
            out.push('<');
            out.push_str(name);
            for (key, attr) in map.iter().filter(|(k, _)| k.starts_with('@')) {
                let attr_value = scalar_text(attr).unwrap_or_else(|| attr.to_string());
                out.push_str(&format!(" {}=\"{}\"", &key[1..], escape_xml(&attr_value)));
            }
            let children: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(k, _)| !k.starts_with('@') && k.as_str() != "#text")
                .collect();
            let text = map.get("#text").and_then(scalar_text);
            if children.is_empty() && text.is_none() {
                out.push_str("/>");
                write_newline(out, pretty);
                return;
            }
            out.push('>');
            if let Some(text) = &text {
                out.push_str(&escape_xml(text));
            }
            if !children.is_empty() {
                write_newline(out, pretty);
                for (key, child) in children {
                    write_element(key, child, out, pretty, depth + 1);
                }
                write_indent(out, pretty, depth);
            }
            out.push_str(&format!("</{name}>"));
            write_newline(out, pretty);
        }
        scalar => {
            write_indent(out, pretty, depth);
            let text = scalar_text(scalar).unwrap_or_default();
            out.push_str(&format!("<{name}>{}</{name}>", escape_xml(&text)));
            write_newline(out, pretty);
        }
    }
}

/// Rescale YAML block indentation from the serializer's two spaces.
fn reindent_yaml(text: &str, indent: usize) -> String {
    if indent == 2 {
        return text.to_string();
    }
    text.lines()
        .map(|line| {
            let leading = line.len() - line.trim_start_matches(' ').len();
            let levels = leading / 2;
            format!("{}{}", " ".repeat(levels * indent), &line[leading..])
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}
