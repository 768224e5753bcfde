//! Typed property values.

use crate::toolkit::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag carried by every property descriptor and value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    String,
    Bool,
    Enum,
    Flags,
    Unichar,
    Object,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Enum => "enum",
            ValueType::Flags => "flags",
            ValueType::Unichar => "unichar",
            ValueType::Object => "object",
        };
        f.write_str(name)
    }
}

/// One entry of an enum or flags table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub value: u32,
    /// Stable identifier written to files.
    pub nick: String,
    /// Human readable label.
    pub name: String,
}

impl EnumValue {
    pub fn new(value: u32, nick: &str, name: &str) -> Self {
        Self {
            value,
            nick: nick.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Enum(u32),
    Flags(u32),
    Unichar(char),
    Object(Option<ObjectId>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Bool(_) => ValueType::Bool,
            Value::Enum(_) => ValueType::Enum,
            Value::Flags(_) => ValueType::Flags,
            Value::Unichar(_) => ValueType::Unichar,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// The zero value for a type.
    pub fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Bool => Value::Bool(false),
            ValueType::Enum => Value::Enum(0),
            ValueType::Flags => Value::Flags(0),
            ValueType::Unichar => Value::Unichar('\0'),
            ValueType::Object => Value::Object(None),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(v) => *v,
            _ => None,
        }
    }
}

/// Booleans are written the way the toolkit's builder format expects.
pub fn format_bool(v: bool) -> &'static str {
    if v { "True" } else { "False" }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "t" | "y" => Some(true),
        "false" | "no" | "0" | "f" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::Int(3).value_type(), ValueType::Int);
        assert_eq!(Value::Unichar('*').value_type(), ValueType::Unichar);
        assert_eq!(Value::Object(None).value_type(), ValueType::Object);
        assert_eq!(Value::zero(ValueType::Flags), Value::Flags(0));
    }

    #[test]
    fn test_bool_parsing() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool(" no "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(format_bool(false), "False");
    }

    #[test]
    fn test_value_type_serde_lowercase() {
        let json = serde_json::to_string(&ValueType::Unichar).unwrap();
        assert_eq!(json, "\"unichar\"");
    }
}
