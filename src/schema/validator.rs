//! Schema validator for entity documents
//!
//! Validation semantics:
//! - All required fields are present
//! - No undeclared fields exist where the schema is closed
//! - Field types exactly match schema types
//! - Enumerations, patterns and formats hold
//!
//! Forbidden behaviors:
//! - Implicit type coercion
//! - Default values
//! - Null values
//!
//! Unlike a write-path validator, this one does not stop at the first
//! violation: authors fix a whole record in one go, so every violation in
//! the document is reported.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::errors::{SchemaError, SchemaResult, ValidationDetails};
use super::references::Reference;
use super::registry::SchemaRegistry;
use super::types::{FieldDef, FieldType};

/// Outcome of checking one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentCheck {
    /// Every schema violation found, in traversal order
    pub violations: Vec<ValidationDetails>,
    /// Registry-bound identifiers found, resolved later for the whole corpus
    pub references: Vec<Reference>,
}

impl DocumentCheck {
    /// True when the document conforms to its schema
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Schema validator over a registry's strict schemas.
///
/// Does not mutate documents. Validation is deterministic.
pub struct SchemaValidator<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> SchemaValidator<'a> {
    /// Creates a new validator backed by the given registry.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Checks a document against the strict schema for `kind`.
    ///
    /// # Errors
    ///
    /// Only an unknown kind is an error; violations are returned in the
    /// `DocumentCheck`.
    pub fn check(&self, kind: &str, document: &Value) -> SchemaResult<DocumentCheck> {
        let schema = self.registry.schema_for(kind)?;
        let mut check = DocumentCheck::default();

        match document.as_object() {
            Some(obj) => validate_object(
                self.registry,
                obj,
                &schema.fields,
                schema.additional_properties,
                "",
                &mut check,
            ),
            None => check.violations.push(ValidationDetails::type_mismatch(
                "$root",
                "object",
                json_type_name(document),
            )),
        }

        Ok(check)
    }

    /// Validates a document, failing with every violation found.
    pub fn validate_document(&self, kind: &str, document: &Value) -> SchemaResult<()> {
        let check = self.check(kind, document)?;
        if check.is_valid() {
            Ok(())
        } else {
            Err(SchemaError::validation_failed(kind, check.violations))
        }
    }
}

fn validate_object(
    registry: &SchemaRegistry,
    obj: &Map<String, Value>,
    fields: &BTreeMap<String, FieldDef>,
    additional_properties: Option<bool>,
    path_prefix: &str,
    check: &mut DocumentCheck,
) {
    // `None` only survives in non-strict schemas, which stay open.
    if additional_properties == Some(false) {
        for key in obj.keys() {
            if !fields.contains_key(key) {
                check
                    .violations
                    .push(ValidationDetails::extra_field(make_path(path_prefix, key)));
            }
        }
    }

    for (field_name, field_def) in fields {
        let field_path = make_path(path_prefix, field_name);

        match obj.get(field_name) {
            Some(Value::Null) => check
                .violations
                .push(ValidationDetails::null_value(&field_path)),
            Some(value) => validate_value(registry, value, &field_def.field_type, &field_path, check),
            None if field_def.required => check
                .violations
                .push(ValidationDetails::missing_field(field_path)),
            None => {}
        }
    }
}

fn validate_value(
    registry: &SchemaRegistry,
    value: &Value,
    expected_type: &FieldType,
    field_path: &str,
    check: &mut DocumentCheck,
) {
    match expected_type {
        FieldType::String {
            values,
            pattern,
            format,
            registry: namespace,
        } => {
            let Some(s) = value.as_str() else {
                check.violations.push(type_error(field_path, "string", value));
                return;
            };
            if let Some(allowed) = values {
                if !allowed.iter().any(|v| v == s) {
                    check.violations.push(ValidationDetails::new(
                        field_path,
                        format!("one of [{}]", allowed.join(", ")),
                        format!("'{}'", s),
                    ));
                }
            }
            if let Some(pattern) = pattern {
                let matched = registry.pattern(pattern).map(|re| re.is_match(s));
                if matched != Some(true) {
                    let actual = match matched {
                        Some(_) => format!("'{}'", s),
                        None => "pattern not compiled by the registry".to_string(),
                    };
                    check.violations.push(ValidationDetails::new(
                        field_path,
                        format!("match for /{}/", pattern),
                        actual,
                    ));
                }
            }
            if let Some(format) = format {
                if !format.accepts(s) {
                    check.violations.push(ValidationDetails::new(
                        field_path,
                        format!("{} format", format.name()),
                        format!("'{}'", s),
                    ));
                }
            }
            if let Some(namespace) = namespace {
                check
                    .references
                    .push(Reference::new(namespace, s, field_path));
            }
        }
        FieldType::Int => {
            if !value.is_i64() && !value.is_u64() {
                check.violations.push(type_error(field_path, "int", value));
            }
        }
        FieldType::Bool => {
            if !value.is_boolean() {
                check.violations.push(type_error(field_path, "bool", value));
            }
        }
        FieldType::Float => {
            // Integers are acceptable floats
            if !value.is_number() {
                check.violations.push(type_error(field_path, "float", value));
            }
        }
        FieldType::Object {
            fields,
            additional_properties,
        } => match value.as_object() {
            Some(obj) => validate_object(registry, obj, fields, *additional_properties, field_path, check),
            None => check.violations.push(type_error(field_path, "object", value)),
        },
        FieldType::Array { element_type } => {
            let Some(arr) = value.as_array() else {
                check.violations.push(type_error(field_path, "array", value));
                return;
            };
            for (i, elem) in arr.iter().enumerate() {
                let elem_path = format!("{}[{}]", field_path, i);
                if elem.is_null() {
                    check.violations.push(ValidationDetails::null_value(&elem_path));
                } else {
                    validate_value(registry, elem, element_type, &elem_path, check);
                }
            }
        }
        FieldType::Map {
            value_type,
            key_registry,
        } => {
            let Some(obj) = value.as_object() else {
                check.violations.push(type_error(field_path, "map", value));
                return;
            };
            for (key, elem) in obj {
                let elem_path = make_path(field_path, key);
                if let Some(namespace) = key_registry {
                    check
                        .references
                        .push(Reference::new(namespace, key.as_str(), &elem_path));
                }
                if elem.is_null() {
                    check.violations.push(ValidationDetails::null_value(&elem_path));
                } else {
                    validate_value(registry, elem, value_type, &elem_path, check);
                }
            }
        }
    }
}

/// Returns the JSON type name for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Creates a field path from prefix and field name.
fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn type_error(field_path: &str, expected: &str, actual: &Value) -> ValidationDetails {
    ValidationDetails::type_mismatch(field_path, expected, json_type_name(actual))
}
