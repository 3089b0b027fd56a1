//! YANG leaf types and typed rendering of leaf values

use serde_json::Value;

use crate::yang::Statement;

/// Represents YANG data types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YangType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64,
    Binary,
    Boolean,
    Empty,
    Identityref,
    Leafref,
    InstanceIdentifier,
    Bits,
    /// Enumeration with its allowed names
    Enumeration(Vec<String>),
    /// Union of multiple types
    Union(Vec<YangType>),
    /// Derived type (typedef) or unrecognized built-in
    Unknown(String),
}

impl YangType {
    /// Build a type from a `type` statement
    pub fn from_statement(stmt: &Statement) -> Self {
        match stmt.arg() {
            "enumeration" => YangType::Enumeration(
                stmt.all("enum").map(|e| e.arg().to_string()).collect(),
            ),
            "union" => YangType::Union(stmt.all("type").map(Self::from_statement).collect()),
            other => Self::from_string(other),
        }
    }

    fn from_string(s: &str) -> Self {
        match s {
            "string" => YangType::String,
            "int8" => YangType::Int8,
            "int16" => YangType::Int16,
            "int32" => YangType::Int32,
            "int64" => YangType::Int64,
            "uint8" => YangType::Uint8,
            "uint16" => YangType::Uint16,
            "uint32" => YangType::Uint32,
            "uint64" => YangType::Uint64,
            "decimal64" => YangType::Decimal64,
            "binary" => YangType::Binary,
            "boolean" => YangType::Boolean,
            "empty" => YangType::Empty,
            "identityref" => YangType::Identityref,
            "leafref" => YangType::Leafref,
            "instance-identifier" => YangType::InstanceIdentifier,
            "bits" => YangType::Bits,
            "enumeration" => YangType::Enumeration(Vec::new()),
            other => YangType::Unknown(other.to_string()),
        }
    }
}

/// Render leaf text as JSON according to the leaf's YANG type.
///
/// This is a presentation helper, not validation: text that does not fit the
/// type is kept as a JSON string.
pub fn cast_leaf_value(text: &str, yang_type: &YangType) -> Value {
    try_cast(text, yang_type).unwrap_or_else(|| Value::String(text.to_string()))
}

fn try_cast(text: &str, yang_type: &YangType) -> Option<Value> {
    let trimmed = text.trim();
    match yang_type {
        YangType::Int8 | YangType::Int16 | YangType::Int32 | YangType::Int64 => {
            trimmed.parse::<i64>().ok().map(|n| Value::Number(n.into()))
        }

        YangType::Uint8 | YangType::Uint16 | YangType::Uint32 | YangType::Uint64 => {
            trimmed.parse::<u64>().ok().map(|n| Value::Number(n.into()))
        }

        YangType::Decimal64 => trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),

        YangType::Boolean => match trimmed {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        YangType::Empty => trimmed.is_empty().then_some(Value::Null),

        YangType::Enumeration(names) => {
            if names.is_empty() || names.iter().any(|n| n == trimmed) {
                Some(Value::String(trimmed.to_string()))
            } else {
                None
            }
        }

        YangType::Union(types) => types.iter().find_map(|t| try_cast(text, t)),

        YangType::String
        | YangType::Binary
        | YangType::Identityref
        | YangType::Leafref
        | YangType::InstanceIdentifier
        | YangType::Bits
        | YangType::Unknown(_) => Some(Value::String(text.to_string())),
    }
}
