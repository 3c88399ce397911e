mod faker;
mod stix;

pub use faker::FakerSemantics;
pub use stix::StixSemantics;

use rand::RngCore;
use serde_json::{Map, Value};

use stixgen_core::{Result, ValueConstraint};

use crate::object::ObjectGenerator;

/// A pluggable source of named custom value generators, invoked from specs
/// via the "semantics" property.
///
/// A provider receives the generator it was invoked through so it can
/// leverage spec generation for parts of its values.  Avoid invoking a named
/// specification from that generator: a provider can't assume which named
/// specs exist, and if the named spec is already mid-generation on the
/// current call stack, the recursion never terminates.  Providers should
/// only generate from specifications that contain no references.
///
/// A provider given a constraint should honor it when that is meaningful
/// for the semantic, but is not required to guarantee satisfaction.
pub trait SemanticsProvider: Send + Sync {
    /// The semantic names this provider supplies.
    fn semantics(&self) -> Vec<&'static str>;

    /// Create a value for a semantic spec.  Extra spec properties beyond
    /// "type" and "semantics" act as keyword-style arguments to the
    /// semantic.
    fn create_semantic(
        &self,
        spec: &Map<String, Value>,
        generator: &ObjectGenerator,
        constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value>;
}
