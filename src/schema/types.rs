//! Schema type definitions
//!
//! Supported types:
//! - string: UTF-8 string, optionally constrained by `values`, `pattern`, `format`
//! - int: 64-bit signed integer
//! - bool: Boolean
//! - float: 64-bit floating point (integers accepted)
//! - object: Nested object with declared fields
//! - array: Homogeneous array with element type
//! - map: Object with arbitrary keys and a homogeneous value type
//!
//! Strings and map keys may name an identifier registry namespace; those
//! values are collected during validation and resolved once per corpus.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Anchors a `pattern` so it has to match the whole value.
pub fn anchored_pattern(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

/// The field every entity document carries, forced to its directory name.
pub const ID_FIELD: &str = "id";

/// Semantic string formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringFormat {
    /// Absolute http(s) URL
    Url,
}

impl StringFormat {
    /// Returns true if `value` satisfies the format
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            StringFormat::Url => {
                let rest = value
                    .strip_prefix("https://")
                    .or_else(|| value.strip_prefix("http://"));
                matches!(rest, Some(host) if !host.is_empty())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StringFormat::Url => "url",
        }
    }
}

/// Supported field types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String {
        /// Allowed values, if enumerated
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<String>>,
        /// Regular expression the whole value must match
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<StringFormat>,
        /// Identifier registry namespace the value must resolve in
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
    },
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 64-bit floating point
    Float,
    /// Nested object with its own field schema
    Object {
        #[serde(default)]
        fields: BTreeMap<String, FieldDef>,
        /// `None` until strict derivation; explicit `true` survives it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        additional_properties: Option<bool>,
    },
    /// Homogeneous array with single element type
    Array {
        element_type: Box<FieldType>,
    },
    /// Arbitrary keys, homogeneous values
    Map {
        value_type: Box<FieldType>,
        /// Identifier registry namespace every key must resolve in
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_registry: Option<String>,
    },
}

impl FieldType {
    /// Plain unconstrained string
    pub fn string() -> Self {
        FieldType::String {
            values: None,
            pattern: None,
            format: None,
            registry: None,
        }
    }

    /// String restricted to `values`
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::String {
            values: Some(values.into_iter().map(Into::into).collect()),
            pattern: None,
            format: None,
            registry: None,
        }
    }

    /// String that must be an http(s) URL
    pub fn url() -> Self {
        FieldType::String {
            values: None,
            pattern: None,
            format: Some(StringFormat::Url),
            registry: None,
        }
    }

    /// Object with declared fields and no explicit openness
    pub fn object(fields: BTreeMap<String, FieldDef>) -> Self {
        FieldType::Object {
            fields,
            additional_properties: None,
        }
    }

    /// Array of `element_type`
    pub fn array(element_type: FieldType) -> Self {
        FieldType::Array {
            element_type: Box::new(element_type),
        }
    }

    /// Map with values of `value_type`
    pub fn map(value_type: FieldType) -> Self {
        FieldType::Map {
            value_type: Box::new(value_type),
            key_registry: None,
        }
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String { .. } => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
            FieldType::Object { .. } => "object",
            FieldType::Array { .. } => "array",
            FieldType::Map { .. } => "map",
        }
    }

    /// Forbids undeclared properties on every object below, unless one says otherwise.
    fn make_strict(&mut self) {
        match self {
            FieldType::Object {
                fields,
                additional_properties,
            } => {
                if additional_properties.is_none() {
                    *additional_properties = Some(false);
                }
                for def in fields.values_mut() {
                    def.field_type.make_strict();
                }
            }
            FieldType::Array { element_type } => element_type.make_strict(),
            FieldType::Map { value_type, .. } => value_type.make_strict(),
            FieldType::String { .. } | FieldType::Int | FieldType::Bool | FieldType::Float => {}
        }
    }

    /// Every `pattern` declared in this type or below it
    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FieldType::String { pattern, .. } => out.extend(pattern.as_deref()),
            FieldType::Object { fields, .. } => {
                for def in fields.values() {
                    def.field_type.collect_patterns(out);
                }
            }
            FieldType::Array { element_type } => element_type.collect_patterns(out),
            FieldType::Map { value_type, .. } => value_type.collect_patterns(out),
            FieldType::Int | FieldType::Bool | FieldType::Float => {}
        }
    }

    fn check_structure(&self, path: &str) -> Result<(), String> {
        match self {
            FieldType::String { pattern, values, .. } => {
                if let Some(pattern) = pattern {
                    Regex::new(&anchored_pattern(pattern))
                        .map_err(|e| format!("invalid pattern at '{}': {}", path, e))?;
                }
                if matches!(values, Some(v) if v.is_empty()) {
                    return Err(format!("empty value enumeration at '{}'", path));
                }
                Ok(())
            }
            FieldType::Object { fields, .. } => {
                for (name, def) in fields {
                    def.field_type
                        .check_structure(&format!("{}.{}", path, name))?;
                }
                Ok(())
            }
            FieldType::Array { element_type } => element_type.check_structure(&format!("{}[]", path)),
            FieldType::Map { value_type, .. } => value_type.check_structure(&format!("{}.*", path)),
            FieldType::Int | FieldType::Bool | FieldType::Float => Ok(()),
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field data type
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether field must be present
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
        }
    }

    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
        }
    }

    /// Create a required string field
    pub fn required_string() -> Self {
        Self::required(FieldType::string())
    }

    /// Create an optional string field
    pub fn optional_string() -> Self {
        Self::optional(FieldType::string())
    }

    /// Create an optional int field
    pub fn optional_int() -> Self {
        Self::optional(FieldType::Int)
    }

    /// Create an optional bool field
    pub fn optional_bool() -> Self {
        Self::optional(FieldType::Bool)
    }

    /// Create an optional object field
    pub fn optional_object(fields: BTreeMap<String, FieldDef>) -> Self {
        Self::optional(FieldType::object(fields))
    }

    /// Create an optional array field
    pub fn optional_array(element_type: FieldType) -> Self {
        Self::optional(FieldType::array(element_type))
    }

    /// Create an optional map field
    pub fn optional_map(value_type: FieldType) -> Self {
        Self::optional(FieldType::map(value_type))
    }
}

/// Complete schema for one entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Entity kind governed, e.g. `asset`
    pub kind: String,
    /// Owning collection, e.g. `assets`
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Openness of the document root; `None` until strict derivation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    /// Top-level field definitions
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    /// Create a new schema
    pub fn new(
        kind: impl Into<String>,
        collection: impl Into<String>,
        fields: BTreeMap<String, FieldDef>,
    ) -> Self {
        Self {
            kind: kind.into(),
            collection: collection.into(),
            description: None,
            additional_properties: None,
            fields,
        }
    }

    /// Derives the strict variant: every object-typed subschema, the root
    /// included, forbids undeclared properties unless it explicitly allows them.
    pub fn into_strict(mut self) -> Self {
        if self.additional_properties.is_none() {
            self.additional_properties = Some(false);
        }
        for def in self.fields.values_mut() {
            def.field_type.make_strict();
        }
        self
    }

    /// Every `pattern` declared anywhere in the schema
    pub fn patterns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for def in self.fields.values() {
            def.field_type.collect_patterns(&mut out);
        }
        out
    }

    /// Validates the schema structure itself (not a document)
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.kind.is_empty() || self.collection.is_empty() {
            return Err("Schema must name a kind and a collection".into());
        }

        // The loader always writes `id`, so a strict schema has to declare it.
        match self.fields.get(ID_FIELD) {
            None => return Err(format!("Schema must define an '{}' field", ID_FIELD)),
            Some(def) if !matches!(def.field_type, FieldType::String { .. }) => {
                return Err(format!("'{}' field must be a string", ID_FIELD));
            }
            Some(_) => {}
        }

        for (name, def) in &self.fields {
            def.field_type.check_structure(name)?;
        }

        Ok(())
    }
}
