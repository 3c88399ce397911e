use serde_json::{Map, Value};

use crate::error::{GenerationError, Result};
use crate::json_type::JsonType;

/// The spec property naming a custom semantic.
pub const SEMANTIC_PROPERTY_NAME: &str = "semantics";

/// How a specification node should be interpreted, classified once per node
/// at generation time and dispatched with a `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecShape<'a> {
    /// The spec is a bare (non-object) literal and IS the value.
    Literal,
    /// A `{"const": ...}` wrapper; the payload is the value.
    Const(&'a Value),
    /// A spec naming a custom semantic, handled by a provider.
    Semantic(&'a str),
    /// A reference to another named spec in the registry.
    Ref(&'a str),
    /// A choice among alternative sub-specs, optionally weighted.
    OneOf(&'a Value),
    /// A plain typed spec, generated by the matching type generator.
    Plain(JsonType),
}

/// Determine the JSON type a spec declares (from "type"), or infer it from a
/// const payload or bare literal.
pub fn spec_type(spec: &Value) -> Result<JsonType> {
    let Value::Object(map) = spec else {
        return Ok(JsonType::of_value(spec));
    };

    if let Some(constant) = map.get("const") {
        return Ok(JsonType::of_value(constant));
    }

    match map.get("type") {
        Some(Value::String(name)) => name.parse(),
        Some(other) => Err(GenerationError::invalid_spec(format!(
            "\"type\" property must be a string, got: {other}"
        ))),
        None => Err(GenerationError::invalid_spec(
            "\"type\" property is missing",
        )),
    }
}

/// Classify a spec node.  `spec_type` must have succeeded on it first for
/// the `Plain` type to be meaningful.
pub fn classify(spec: &Value) -> Result<SpecShape<'_>> {
    let Value::Object(map) = spec else {
        return Ok(SpecShape::Literal);
    };

    if let Some(constant) = map.get("const") {
        return Ok(SpecShape::Const(constant));
    }

    if let Some(semantic) = map.get(SEMANTIC_PROPERTY_NAME) {
        let name = semantic.as_str().ok_or_else(|| {
            GenerationError::invalid_spec("\"semantics\" property must be a string")
        })?;
        return Ok(SpecShape::Semantic(name));
    }

    if let Some(target) = map.get("ref") {
        let name = target
            .as_str()
            .ok_or_else(|| GenerationError::invalid_spec("\"ref\" property must be a string"))?;
        return Ok(SpecShape::Ref(name));
    }

    if let Some(one_of) = map.get("oneOf") {
        return Ok(SpecShape::OneOf(one_of));
    }

    Ok(SpecShape::Plain(spec_type(spec)?))
}

/// Read a spec property expected to hold an array of strings.
pub fn string_array(map: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    let array = value.as_array().ok_or_else(|| {
        GenerationError::invalid_spec(format!("\"{key}\" must be an array of strings"))
    })?;
    let mut names = Vec::with_capacity(array.len());
    for entry in array {
        let name = entry.as_str().ok_or_else(|| {
            GenerationError::invalid_spec(format!("\"{key}\" must be an array of strings"))
        })?;
        names.push(name.to_string());
    }
    Ok(Some(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn literal_and_const_types_are_inferred() {
        assert_eq!(spec_type(&json!(12)).unwrap(), JsonType::Integer);
        assert_eq!(
            spec_type(&json!({"const": "fixed"})).unwrap(),
            JsonType::String
        );
    }

    #[test]
    fn missing_type_is_an_error() {
        let err = spec_type(&json!({"minimum": 1})).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSpec(_)));
    }

    #[test]
    fn const_wins_over_semantics() {
        let spec = json!({"const": 3, "semantics": "name", "type": "integer"});
        assert!(matches!(classify(&spec).unwrap(), SpecShape::Const(_)));
    }

    #[test]
    fn classification_order() {
        assert!(matches!(classify(&json!("lit")).unwrap(), SpecShape::Literal));
        assert!(matches!(
            classify(&json!({"type": "string", "semantics": "name"})).unwrap(),
            SpecShape::Semantic("name")
        ));
        assert!(matches!(
            classify(&json!({"type": "string", "ref": "other"})).unwrap(),
            SpecShape::Ref("other")
        ));
        assert!(matches!(
            classify(&json!({"type": "string", "oneOf": ["a", "b"]})).unwrap(),
            SpecShape::OneOf(_)
        ));
        assert!(matches!(
            classify(&json!({"type": "boolean"})).unwrap(),
            SpecShape::Plain(JsonType::Boolean)
        ));
    }
}
