use serde::Deserialize;

/// Settings for the object generator.
///
/// The number settings apply to both "number" and "integer" specs and act as
/// the default interval when a spec gives no bounds.
/// `optional_property_probability` is the inclusion probability for optional
/// properties, in [0, 1].
///
/// With `minimize_ref_properties` set, the generator suppresses optional
/// reference properties (overriding `optional_property_probability` for
/// them) while still satisfying spec constraints; a reference property
/// needed to satisfy a constraint is included regardless.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObjectGeneratorConfig {
    pub string_length_min: i64,
    pub string_length_max: i64,
    pub string_chars: String,
    pub number_min: f64,
    pub is_number_min_exclusive: bool,
    pub number_max: f64,
    pub is_number_max_exclusive: bool,
    pub array_length_min: i64,
    pub array_length_max: i64,
    pub optional_property_probability: f64,
    pub minimize_ref_properties: bool,
}

impl Default for ObjectGeneratorConfig {
    fn default() -> Self {
        Self {
            string_length_min: 5,
            string_length_max: 20,
            string_chars: "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
            number_min: -1000.0,
            is_number_min_exclusive: false,
            number_max: 1000.0,
            is_number_max_exclusive: false,
            array_length_min: 1,
            array_length_max: 5,
            optional_property_probability: 0.5,
            minimize_ref_properties: true,
        }
    }
}

/// Styles of reference graph.
///
/// - `Tree`: no object reuse; in-degree never exceeds one (objects carrying
///   fixed well-known identifiers excepted).
/// - `Dag`: objects may be reused as long as no cycle is created.
/// - `Random`: objects are randomly reused without regard to cycles.
///
/// The acyclic topologies are still subject to inverse-property cycles, so
/// a truly acyclic graph also requires an inverse policy other than
/// [`InversePolicy::Enforce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    Tree,
    Dag,
    Random,
}

/// How to handle inverse property constraints when linking objects.
///
/// - `Enforce`: force the counterpart property to point back.  Inverse
///   properties then always form cycles.
/// - `Delete`: strip the would-be-conflicting counterpart property from the
///   new object.  Done without regard to whether the spec required it.
/// - `Ignore`: leave both properties alone.  May produce structurally valid
///   but semantically contradictory content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversePolicy {
    Enforce,
    Delete,
    Ignore,
}

/// Settings for reference graph generation.
///
/// `max_depth` bounds how many steps from the seed object growth continues
/// before switching to reference-minimizing generation.  It is a soft limit:
/// required reference properties cannot be suppressed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefGraphConfig {
    pub max_depth: u32,
    pub graph_type: GraphType,
    pub probability_reuse: f64,
    pub inverse_property_constraints: InversePolicy,
}

impl Default for RefGraphConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            graph_type: GraphType::Dag,
            probability_reuse: 0.5,
            inverse_property_constraints: InversePolicy::Enforce,
        }
    }
}

/// Settings for STIX graph assembly.
///
/// One endpoint of every relationship connects to existing content to avoid
/// partitioning the graph; `probability_reuse` determines how likely the
/// other endpoint is to also reuse existing content.  Each added edge is a
/// sighting attempt with `probability_sighting`, falling back to a plain
/// relationship.  `complete_ref_properties` controls whether dangling
/// reference properties of new objects are resolved through the reference
/// graph generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StixGeneratorConfig {
    pub min_relationships: u32,
    pub max_relationships: u32,
    pub probability_reuse: f64,
    pub probability_sighting: f64,
    pub complete_ref_properties: bool,
}

impl Default for StixGeneratorConfig {
    fn default() -> Self {
        Self {
            min_relationships: 3,
            max_relationships: 6,
            probability_reuse: 0.5,
            probability_sighting: 0.2,
            complete_ref_properties: true,
        }
    }
}
