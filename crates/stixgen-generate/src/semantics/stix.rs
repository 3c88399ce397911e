use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rand::{Rng, RngCore};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha512};

use stixgen_core::error::ErrorKind;
use stixgen_core::{
    CmpOp, GenerationError, Result, SEMANTIC_PROPERTY_NAME, STIX_VERSION, TypeClass,
    ValueConstraint, identifier, random_generatable_stix_type,
};

use crate::config::RefGraphConfig;
use crate::object::ObjectGenerator;
use crate::ref_graph::ReferenceGraphGenerator;
use crate::semantics::SemanticsProvider;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const TIMESTAMP_FORMAT_FRAC: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const SECONDS_PER_YEAR: i64 = 60 * 60 * 24 * 365;

/// STIX-specific custom semantics.
pub struct StixSemantics;

impl SemanticsProvider for StixSemantics {
    fn semantics(&self) -> Vec<&'static str> {
        vec![
            "stix-id",
            "stix-timestamp",
            "sha256",
            "sha512",
            "observable-container",
        ]
    }

    fn create_semantic(
        &self,
        spec: &Map<String, Value>,
        generator: &ObjectGenerator,
        constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let name = spec
            .get(SEMANTIC_PROPERTY_NAME)
            .and_then(Value::as_str)
            .unwrap_or_default();
        match name {
            "stix-id" => stix_id(spec, rng),
            "stix-timestamp" => stix_timestamp(constraint, rng),
            "sha256" => Ok(random_hash::<Sha256>(rng)),
            "sha512" => Ok(random_hash::<Sha512>(rng)),
            "observable-container" => observable_container(spec, generator, rng),
            other => Err(ErrorKind::UnknownSemantic(other.to_string()).into()),
        }
    }
}

/// A STIX ID whose type prefix comes from the spec's "stix-type" property.
fn stix_id(spec: &Map<String, Value>, rng: &mut dyn RngCore) -> Result<Value> {
    let stix_type = spec
        .get("stix-type")
        .and_then(Value::as_str)
        .ok_or_else(|| GenerationError::invalid_spec("missing required \"stix-type\" property"))?;
    Ok(Value::String(identifier::random_id(stix_type, rng)))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let format = if text.contains('.') {
        TIMESTAMP_FORMAT_FRAC
    } else {
        TIMESTAMP_FORMAT
    };
    NaiveDateTime::parse_from_str(text, format)
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            GenerationError::invalid_spec(format!("invalid timestamp constraint value '{text}': {e}"))
        })
}

/// A random STIX timestamp honoring the given constraint, if any.  The
/// unconstrained window (and the window relative to a constraint value) is
/// one year.
fn stix_timestamp(constraint: Option<&ValueConstraint>, rng: &mut dyn RngCore) -> Result<Value> {
    let timestamp = match constraint {
        Some(constraint) => {
            let text = constraint.value.as_str().ok_or_else(|| {
                GenerationError::invalid_spec("timestamp constraint value must be a string")
            })?;
            let constraint_dt = parse_timestamp(text)?;

            match constraint.op {
                CmpOp::Eq => constraint_dt,
                op => {
                    let equal_allowed = matches!(op, CmpOp::Ge | CmpOp::Le);
                    let seconds =
                        rng.random_range(if equal_allowed { 0 } else { 1 }..SECONDS_PER_YEAR);
                    let mut offset = Duration::seconds(seconds);
                    if matches!(op, CmpOp::Lt | CmpOp::Le)
                        || (op == CmpOp::Ne && rng.random_bool(0.5))
                    {
                        offset = -offset;
                    }
                    constraint_dt + offset
                }
            }
        }
        None => {
            let seconds = rng.random_range(0..SECONDS_PER_YEAR);
            let mut offset = Duration::seconds(seconds);
            if rng.random_bool(0.5) {
                offset = -offset;
            }
            Utc::now() + offset
        }
    };

    Ok(Value::String(timestamp.format(TIMESTAMP_FORMAT).to_string()))
}

fn random_hash<D: Digest>(rng: &mut dyn RngCore) -> Value {
    let mut input = [0_u8; 16];
    rng.fill_bytes(&mut input);
    Value::String(hex::encode(D::digest(input)))
}

/// An inner SCO reference graph, returned whole as an id→object mapping.
/// Extra spec properties configure the inner reference graph generator.
fn observable_container(
    spec: &Map<String, Value>,
    generator: &ObjectGenerator,
    rng: &mut dyn RngCore,
) -> Result<Value> {
    let mut params = spec.clone();
    params.remove("type");
    params.remove(SEMANTIC_PROPERTY_NAME);
    let config: RefGraphConfig = serde_json::from_value(Value::Object(params)).map_err(|e| {
        GenerationError::invalid_spec(format!("invalid observable-container settings: {e}"))
    })?;

    let sco_type = random_generatable_stix_type(
        generator.spec_names(),
        &[TypeClass::Sco.into()],
        rng,
    )
    .ok_or_else(|| ErrorKind::SeedTypeNotFound {
        constraints: vec!["SCO".to_string()],
        version: STIX_VERSION.to_string(),
    })?;

    let container_generator = ReferenceGraphGenerator::new(generator.clone(), config);
    let (_seed_id, graph) = container_generator.generate(Some(&sco_type), None, rng)?;
    Ok(Value::Object(graph.into_objects_map()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    #[test]
    fn timestamps_honor_inequality_constraints() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let anchor = "2024-06-01T12:00:00Z";

        for (op, expect_after) in [
            (CmpOp::Ge, true),
            (CmpOp::Gt, true),
            (CmpOp::Le, false),
            (CmpOp::Lt, false),
        ] {
            let constraint = ValueConstraint {
                op,
                value: json!(anchor),
            };
            for _ in 0..16 {
                let value = stix_timestamp(Some(&constraint), &mut rng).unwrap();
                let text = value.as_str().unwrap().to_string();
                if expect_after {
                    assert!(text.as_str() >= anchor, "{op:?}: {text} < {anchor}");
                } else {
                    assert!(text.as_str() <= anchor, "{op:?}: {text} > {anchor}");
                }
            }
        }
    }

    #[test]
    fn equality_constraint_copies_the_value() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let constraint = ValueConstraint {
            op: CmpOp::Eq,
            value: json!("2024-06-01T12:00:00.5Z"),
        };
        let value = stix_timestamp(Some(&constraint), &mut rng).unwrap();
        assert_eq!(value, json!("2024-06-01T12:00:00Z"));
    }

    #[test]
    fn hashes_have_the_right_width() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert_eq!(random_hash::<Sha256>(&mut rng).as_str().unwrap().len(), 64);
        assert_eq!(random_hash::<Sha512>(&mut rng).as_str().unwrap().len(), 128);
    }
}
