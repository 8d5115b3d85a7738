//! Recursive output schemas.
//!
//! [`OutputSchema`] is the JSON-Schema subset the runtime understands: the
//! seven primitive types plus the constraints tools and validators consult.
//! The same type describes tool parameter schemas and expected LLM output
//! shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// A UTF-8 string.
    String,
    /// Any numeric value.
    Number,
    /// An integer-valued number.
    Integer,
    /// A boolean.
    Boolean,
    /// A sequence.
    Array,
    /// A mapping with named properties.
    Object,
    /// The null value.
    Null,
}

impl SchemaType {
    /// The JSON-Schema name of the type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }
}

/// A recursive schema describing an expected value shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// The node type.
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    /// Human-readable description, forwarded to providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Closed set of permitted values.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Regular-expression constraint for strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Named structural format (`email`, `date`, `time`, `date-time`,
    /// `uri`, `uuid`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Inclusive numeric lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive numeric upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum number of array items.
    #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    /// Maximum number of array items.
    #[serde(rename = "maxItems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Named properties of an object node. Ordered for deterministic
    /// serialization.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, OutputSchema>,
    /// Property names that must be present on an object node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Element schema of an array node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<OutputSchema>>,
    /// Whether properties beyond `properties` are permitted. `None` means
    /// permitted with a validation warning.
    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
}

impl OutputSchema {
    /// Create a bare schema of the given type.
    #[must_use]
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            description: None,
            enum_values: None,
            pattern: None,
            format: None,
            minimum: None,
            maximum: None,
            min_items: None,
            max_items: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
            items: None,
            additional_properties: None,
        }
    }

    /// A string schema.
    #[must_use]
    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    /// A number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    /// An integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    /// A boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    /// A null schema.
    #[must_use]
    pub fn null() -> Self {
        Self::of(SchemaType::Null)
    }

    /// An array schema with the given element schema.
    #[must_use]
    pub fn array(items: Self) -> Self {
        let mut schema = Self::of(SchemaType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    /// An object schema with no properties yet.
    #[must_use]
    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an optional property to an object schema.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: Self) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Add a required property to an object schema.
    #[must_use]
    pub fn with_required_property(mut self, name: impl Into<String>, schema: Self) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Restrict to a closed set of values.
    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Constrain strings by a regular expression.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Constrain strings to a named structural format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Constrain numbers to an inclusive range. Either bound may be open.
    #[must_use]
    pub const fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Constrain array length.
    #[must_use]
    pub const fn with_items_range(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }

    /// Forbid or explicitly permit unknown properties.
    #[must_use]
    pub const fn with_additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    /// Whether `name` is listed as required.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// The schema as a plain JSON value, for provider tool catalogs.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_produces_nested_schema() {
        let schema = OutputSchema::object()
            .with_required_property("name", OutputSchema::string())
            .with_property("age", OutputSchema::integer().with_range(Some(0.0), None))
            .with_property("tags", OutputSchema::array(OutputSchema::string()));

        assert_eq!(schema.schema_type, SchemaType::Object);
        assert!(schema.is_required("name"));
        assert!(!schema.is_required("age"));
        assert_eq!(
            schema.properties["tags"].items.as_ref().unwrap().schema_type,
            SchemaType::String
        );
    }

    #[test]
    fn serializes_with_json_schema_names() {
        let schema = OutputSchema::array(OutputSchema::integer()).with_items_range(Some(1), Some(5));
        let value = schema.to_value();
        assert_eq!(value["type"], json!("array"));
        assert_eq!(value["minItems"], json!(1));
        assert_eq!(value["maxItems"], json!(5));
        assert_eq!(value["items"]["type"], json!("integer"));
    }

    #[test]
    fn enum_round_trips() {
        let schema = OutputSchema::string().with_enum(vec![json!("a"), json!("b")]);
        let value = schema.to_value();
        assert_eq!(value["enum"], json!(["a", "b"]));
        let back: OutputSchema = serde_json::from_value(value).unwrap();
        assert_eq!(back.enum_values.unwrap().len(), 2);
    }

    #[test]
    fn additional_properties_flag_serializes() {
        let schema = OutputSchema::object().with_additional_properties(false);
        assert_eq!(schema.to_value()["additionalProperties"], json!(false));
    }
}
