use serde_json::{Map, Value};

use crate::error::{ErrorKind, GenerationError, Result};

const STIX21_REGISTRY: &str = include_str!("../specs/stix21_registry.json");

/// An immutable name→specification mapping.  Built once before generation
/// begins and never mutated afterwards; share it across generators with an
/// `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SpecRegistry {
    specs: Map<String, Value>,
}

impl SpecRegistry {
    /// Load the bundled registry for a STIX version, optionally overlaying
    /// caller-supplied specs (nested mappings merge key-wise, everything
    /// else overwrites).
    pub fn builtin(stix_version: &str, extra_specs: Option<&Value>) -> Result<Self> {
        let source = match stix_version {
            "2.1" => STIX21_REGISTRY,
            other => return Err(ErrorKind::RegistryNotFound(other.to_string()).into()),
        };

        let base: Value = serde_json::from_str(source).map_err(|e| {
            GenerationError::invalid_spec(format!("built-in registry is not valid JSON: {e}"))
        })?;

        let merged = match extra_specs {
            Some(extra) => deep_merge(&base, extra),
            None => base,
        };

        Self::from_value(merged)
    }

    /// Build a registry from an already-parsed name→spec JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(specs) => Ok(Self { specs }),
            _ => Err(GenerationError::invalid_spec(
                "spec registry must be a JSON object mapping names to specifications",
            )),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Recursively merge two JSON trees into a new one.  Where both sides hold
/// objects the keys merge; any other overlay value overwrites the base.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let next = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
