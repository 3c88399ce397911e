use rand::Rng;
use rand::seq::IndexedRandom;

/// STIX 2.1 domain object types.
pub const SDO_TYPES: &[&str] = &[
    "attack-pattern",
    "campaign",
    "course-of-action",
    "grouping",
    "identity",
    "incident",
    "indicator",
    "infrastructure",
    "intrusion-set",
    "location",
    "malware",
    "malware-analysis",
    "note",
    "observed-data",
    "opinion",
    "report",
    "threat-actor",
    "tool",
    "vulnerability",
];

/// STIX 2.1 cyber-observable object types.
pub const SCO_TYPES: &[&str] = &[
    "artifact",
    "autonomous-system",
    "directory",
    "domain-name",
    "email-addr",
    "email-message",
    "file",
    "ipv4-addr",
    "ipv6-addr",
    "mac-addr",
    "mutex",
    "network-traffic",
    "process",
    "software",
    "url",
    "user-account",
    "windows-registry-key",
    "x509-certificate",
];

/// STIX 2.1 relationship object types.
pub const SRO_TYPES: &[&str] = &["relationship", "sighting"];

/// Classes of STIX type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Sdo,
    Sco,
    Sro,
}

/// A constraint on a STIX type: exact name, or membership in a class.
/// Multiple constraints are OR'd together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeConstraint {
    Exact(String),
    Class(TypeClass),
}

impl From<&str> for TypeConstraint {
    fn from(stix_type: &str) -> Self {
        TypeConstraint::Exact(stix_type.to_string())
    }
}

impl From<TypeClass> for TypeConstraint {
    fn from(class: TypeClass) -> Self {
        TypeConstraint::Class(class)
    }
}

impl std::fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeConstraint::Exact(name) => f.write_str(name),
            TypeConstraint::Class(TypeClass::Sdo) => f.write_str("SDO"),
            TypeConstraint::Class(TypeClass::Sco) => f.write_str("SCO"),
            TypeConstraint::Class(TypeClass::Sro) => f.write_str("SRO"),
        }
    }
}

pub fn is_sdo(stix_type: &str) -> bool {
    SDO_TYPES.contains(&stix_type)
}

pub fn is_sco(stix_type: &str) -> bool {
    SCO_TYPES.contains(&stix_type)
}

pub fn is_sro(stix_type: &str) -> bool {
    SRO_TYPES.contains(&stix_type)
}

/// Whether a type is any recognized STIX object type.
pub fn is_object(stix_type: &str) -> bool {
    is_sdo(stix_type) || is_sco(stix_type) || is_sro(stix_type)
}

/// Whether a type satisfies any of the given constraints.  An exact-name
/// constraint also requires the name to be a recognized STIX type.
pub fn is_stix_type(stix_type: &str, constraints: &[TypeConstraint]) -> bool {
    constraints.iter().any(|constraint| match constraint {
        TypeConstraint::Exact(name) => is_object(stix_type) && stix_type == name,
        TypeConstraint::Class(TypeClass::Sdo) => is_sdo(stix_type),
        TypeConstraint::Class(TypeClass::Sco) => is_sco(stix_type),
        TypeConstraint::Class(TypeClass::Sro) => is_sro(stix_type),
    })
}

/// Choose a random type satisfying the constraints from the given spec
/// names (the generatable types).  None if no candidate matches, or if no
/// constraints are given (no types are then legal).
pub fn random_generatable_stix_type<'a>(
    spec_names: impl Iterator<Item = &'a str>,
    constraints: &[TypeConstraint],
    rng: &mut (impl Rng + ?Sized),
) -> Option<String> {
    let candidates: Vec<&str> = spec_names
        .filter(|name| is_stix_type(name, constraints))
        .collect();
    candidates.choose(rng).map(|name| (*name).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn classes_are_disjoint() {
        assert!(is_sdo("malware"));
        assert!(!is_sdo("relationship"));
        assert!(is_sco("file"));
        assert!(is_sro("sighting"));
        assert!(!is_object("sdo-common"));
    }

    #[test]
    fn exact_constraint_requires_known_type() {
        assert!(is_stix_type("malware", &["malware".into()]));
        assert!(!is_stix_type("sdo-common", &["sdo-common".into()]));
        assert!(is_stix_type("file", &[TypeClass::Sdo.into(), TypeClass::Sco.into()]));
    }

    #[test]
    fn random_type_respects_constraints() {
        let names = ["malware", "file", "string-common", "relationship"];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..16 {
            let chosen =
                random_generatable_stix_type(names.iter().copied(), &[TypeClass::Sco.into()], &mut rng)
                    .unwrap();
            assert_eq!(chosen, "file");
        }
        assert_eq!(
            random_generatable_stix_type(names.iter().copied(), &[], &mut rng),
            None
        );
    }
}
