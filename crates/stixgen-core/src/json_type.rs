use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{ErrorKind, GenerationError};

/// The six JSON value types a specification may declare (plus null).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl JsonType {
    pub const ALL: [JsonType; 7] = [
        JsonType::String,
        JsonType::Number,
        JsonType::Integer,
        JsonType::Boolean,
        JsonType::Object,
        JsonType::Array,
        JsonType::Null,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Null => "null",
        }
    }

    /// Infer the JSON type of a concrete value.  Numbers with an integral
    /// representation are integers; everything else with a fraction is a
    /// number.
    pub fn of_value(value: &Value) -> JsonType {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    JsonType::Integer
                } else {
                    JsonType::Number
                }
            }
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JsonType {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JsonType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ErrorKind::UnrecognizedJsonType(s.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_integer_and_number() {
        assert_eq!(JsonType::of_value(&json!(3)), JsonType::Integer);
        assert_eq!(JsonType::of_value(&json!(3.5)), JsonType::Number);
        assert_eq!(JsonType::of_value(&json!("x")), JsonType::String);
        assert_eq!(JsonType::of_value(&json!(null)), JsonType::Null);
    }

    #[test]
    fn rejects_unknown_type_name() {
        let err = "decimal".parse::<JsonType>().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnrecognizedJsonType(_)));
    }
}
