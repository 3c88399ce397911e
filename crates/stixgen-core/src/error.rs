use std::fmt;

use thiserror::Error;

use crate::json_type::JsonType;

/// The concrete failure behind a [`GenerationError`].
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// No bundled spec registry exists for the requested STIX version.
    #[error("Object specification registry not found for STIX version {0}")]
    RegistryNotFound(String),
    /// A spec's "type" property (or an expected type) is not a JSON type.
    #[error("unrecognized JSON type: {0}")]
    UnrecognizedJsonType(String),
    /// A spec was required to produce one type but declares another.
    #[error("Type mismatch: expected '{expected}' but got '{actual}'")]
    TypeMismatch {
        expected: JsonType,
        actual: JsonType,
    },
    /// Named specs refer to each other in a cycle.
    #[error("Specification reference cycle detected: {}", .cycle.join(" > "))]
    CyclicSpecReference { cycle: Vec<String> },
    /// A named spec is missing from the registry.
    #[error("Spec not found: '{0}'")]
    SpecNotFound(String),
    /// "required"/"optional" (or a dependency) names an undefined property.
    #[error("Reference to undefined property(s): {}", .names.join(", "))]
    UndefinedProperty { names: Vec<String> },
    /// A presence co-constraint property group is malformed.
    #[error("Invalid property group \"{group}\": {reason}")]
    InvalidPropertyGroup { group: String, reason: String },
    /// A presence co-constraint is malformed in some other way.
    #[error("{0}")]
    PresenceCoconstraint(String),
    /// A value co-constraint expression is malformed.
    #[error("Invalid value co-constraint '{expr}': {reason}")]
    ValueCoconstraint { expr: String, reason: String },
    /// A semantic produced a value whose type disagrees with the spec.
    #[error(
        "Semantic '{semantic}' produced a value of the wrong type: expected {expected}, got {actual}"
    )]
    SemanticTypeMismatch {
        semantic: String,
        expected: JsonType,
        actual: JsonType,
    },
    /// A spec names a semantic no provider supplies.
    #[error("unrecognized semantic: {0}")]
    UnknownSemantic(String),
    /// No registered spec satisfies the given seed-type constraints.
    #[error(
        "Could not find an object generator specification for a STIX {version} type satisfying the constraints: {constraints:?}"
    )]
    SeedTypeNotFound {
        constraints: Vec<String>,
        version: String,
    },
    /// Anything else wrong with a specification or generated content.
    #[error("{0}")]
    InvalidSpec(String),
}

/// Error type for spec interpretation and graph generation.
///
/// Carries a context trail: the spec type (a JSON type or semantic name) and
/// the stack of enclosing named-spec references.  Both are attached once, at
/// the innermost frame that knows them, as the error propagates outward; the
/// rendered message then pinpoints where in a nested spec the failure
/// occurred without every call site pre-formatting context.
#[derive(Debug)]
pub struct GenerationError {
    kind: ErrorKind,
    spec_type: Option<String>,
    name_stack: Vec<String>,
}

impl GenerationError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            spec_type: None,
            name_stack: Vec::new(),
        }
    }

    /// Shorthand for the generic [`ErrorKind::InvalidSpec`].
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSpec(message.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn spec_type(&self) -> Option<&str> {
        self.spec_type.as_deref()
    }

    pub fn name_stack(&self) -> &[String] {
        &self.name_stack
    }

    /// Attach the spec type (JSON type or semantic name), unless a deeper
    /// frame already did.
    #[must_use]
    pub fn with_spec_type(mut self, spec_type: impl Into<String>) -> Self {
        if self.spec_type.is_none() {
            self.spec_type = Some(spec_type.into());
        }
        self
    }

    /// Attach the enclosing named-spec stack, unless a deeper frame already
    /// did.
    #[must_use]
    pub fn with_name_stack(mut self, stack: &[String]) -> Self {
        if self.name_stack.is_empty() {
            self.name_stack = stack.to_vec();
        }
        self
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name_stack.is_empty() {
            let path = self
                .name_stack
                .iter()
                .map(|name| format!("'{name}'"))
                .collect::<Vec<_>>()
                .join(" > ");
            write!(f, "In specification {path}: ")?;
        }
        if let Some(spec_type) = &self.spec_type {
            write!(f, "Error generating {spec_type}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for GenerationError {}

impl From<ErrorKind> for GenerationError {
    fn from(kind: ErrorKind) -> Self {
        GenerationError::new(kind)
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_attached_once() {
        let err = GenerationError::invalid_spec("minItems must be non-negative")
            .with_spec_type("array")
            .with_spec_type("object")
            .with_name_stack(&["inner".to_string()])
            .with_name_stack(&["outer".to_string(), "inner".to_string()]);

        assert_eq!(err.spec_type(), Some("array"));
        assert_eq!(err.name_stack(), ["inner".to_string()]);
        assert_eq!(
            err.to_string(),
            "In specification 'inner': Error generating array: minItems must be non-negative"
        );
    }
}
