//! Argument validation against a tool's declared parameter schema.
//!
//! Supports the subset of JSON Schema tools declare here: an object with
//! `properties`, `required`, and a primitive `type` per property.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Model-supplied arguments that do not fit the tool's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid arguments for tool '{tool}': {kind}")]
pub struct SchemaViolation {
    pub tool: String,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    NotAnObject,
    UnknownField(String),
    MissingField(String),
    WrongType { field: String, expected: String },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "arguments must be a JSON object"),
            Self::UnknownField(field) => write!(f, "unknown field '{}'", field),
            Self::MissingField(field) => write!(f, "missing required field '{}'", field),
            Self::WrongType { field, expected } => {
                write!(f, "field '{}' must be of type {}", field, expected)
            }
        }
    }
}

/// Check that a declared schema is usable for validation.
pub(super) fn check_schema(schema: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err("top-level type must be \"object\"".to_string());
    }
    if let Some(properties) = schema.get("properties") {
        if !properties.is_object() {
            return Err("\"properties\" must be an object".to_string());
        }
    }
    if let Some(required) = schema.get("required") {
        let names = required
            .as_array()
            .ok_or_else(|| "\"required\" must be an array".to_string())?;
        for name in names {
            let name = name
                .as_str()
                .ok_or_else(|| "\"required\" entries must be strings".to_string())?;
            if property(schema, name).is_none() {
                return Err(format!("required field '{}' is not declared", name));
            }
        }
    }
    Ok(())
}

/// Validate `args` for `tool` against `schema`.
///
/// Rejects non-object arguments, undeclared fields, missing required fields
/// and values whose JSON type contradicts the declared one. An explicit `null`
/// for an optional field counts as absent.
pub(super) fn validate(tool: &str, schema: &Value, args: &Value) -> Result<(), SchemaViolation> {
    let violation = |kind| SchemaViolation {
        tool: tool.to_string(),
        kind,
    };

    let fields = args
        .as_object()
        .ok_or_else(|| violation(ViolationKind::NotAnObject))?;

    for (field, value) in fields {
        let declared = property(schema, field)
            .ok_or_else(|| violation(ViolationKind::UnknownField(field.clone())))?;

        if value.is_null() {
            if is_required(schema, field) {
                return Err(violation(ViolationKind::MissingField(field.clone())));
            }
            continue;
        }
        if let Some(expected) = declared.get("type").and_then(Value::as_str) {
            if !matches_type(value, expected) {
                return Err(violation(ViolationKind::WrongType {
                    field: field.clone(),
                    expected: expected.to_string(),
                }));
            }
        }
    }

    for field in required_fields(schema) {
        match fields.get(field) {
            Some(value) if !value.is_null() => {}
            _ => return Err(violation(ViolationKind::MissingField(field.to_string()))),
        }
    }

    Ok(())
}

fn property<'a>(schema: &'a Value, name: &str) -> Option<&'a Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|properties: &Map<String, Value>| properties.get(name))
}

fn required_fields(schema: &Value) -> impl Iterator<Item = &str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn is_required(schema: &Value, field: &str) -> bool {
    required_fields(schema).any(|name| name == field)
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Types outside the supported subset are not enforced.
        _ => true,
    }
}
