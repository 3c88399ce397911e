use std::collections::HashSet;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, RngCore};
use serde_json::{Map, Value};

use stixgen_core::error::ErrorKind;
use stixgen_core::{
    GenerationError, RefSite, Result, STIX_VERSION, TypeClass, TypeConstraint, find_references,
    find_reference_sites, identifier, random_generatable_stix_type, set_at_path,
};

use crate::config::{GraphType, InversePolicy, RefGraphConfig};
use crate::graph::ObjectGraph;
use crate::object::ObjectGenerator;

/// An "inverse" property constraint: reference properties in each of two
/// object types must refer to each others' objects.  An example is
/// directory/contains_refs and file/parent_directory_ref.  Satisfying such
/// a pair necessarily implies a cycle in the graph.
///
/// The constraint description is symmetric: (type1, A, type2, B) means the
/// same as (type2, B, type1, A).  Application is not: when the types are
/// equal an instance may carry both constraint properties, and the
/// constraint can apply in two different ways.  The `ref_prop` parameter of
/// the methods names which property of the source object is being followed,
/// resolving the ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InversePropertyConstraint {
    object_type1: &'static str,
    prop_name1: &'static str,
    object_type2: &'static str,
    prop_name2: &'static str,
}

impl InversePropertyConstraint {
    /// Only top-level properties are supported; a bare property name can't
    /// address nested locations.
    pub const fn new(
        object_type1: &'static str,
        prop_name1: &'static str,
        object_type2: &'static str,
        prop_name2: &'static str,
    ) -> Self {
        Self {
            object_type1,
            prop_name1,
            object_type2,
            prop_name2,
        }
    }

    /// Whether this constraint would constrain an inverse property of
    /// `dest_obj`, given that `src_obj` refers to it via `ref_prop`.  The
    /// destination must carry the inverse property and the source must
    /// actually refer to the destination; the destination need not refer
    /// back (if the constraint were enforced, it would).
    pub fn is_applicable(
        &self,
        src_obj: &Map<String, Value>,
        ref_prop: &str,
        dest_obj: &Map<String, Value>,
    ) -> bool {
        let src_type = object_type(src_obj);
        let dest_type = object_type(dest_obj);
        let Some(dest_id) = dest_obj.get("id").and_then(Value::as_str) else {
            return false;
        };

        if self.object_type1 == src_type
            && self.prop_name1 == ref_prop
            && src_obj.contains_key(self.prop_name1)
            && self.object_type2 == dest_type
            && dest_obj.contains_key(self.prop_name2)
        {
            refers_to(src_obj, self.prop_name1, dest_id)
        } else if self.object_type2 == src_type
            && self.prop_name2 == ref_prop
            && src_obj.contains_key(self.prop_name2)
            && self.object_type1 == dest_type
            && dest_obj.contains_key(self.prop_name1)
        {
            refers_to(src_obj, self.prop_name2, dest_id)
        } else {
            false
        }
    }

    /// Applicability on types alone: would linking an instance of
    /// `src_type` to an instance of `dest_type` via `ref_prop` constrain the
    /// destination (assuming it had the inverse property)?
    pub fn is_applicable_types(&self, src_type: &str, ref_prop: &str, dest_type: &str) -> bool {
        (self.object_type1 == src_type
            && self.prop_name1 == ref_prop
            && self.object_type2 == dest_type)
            || (self.object_type2 == src_type
                && self.prop_name2 == ref_prop
                && self.object_type1 == dest_type)
    }

    /// Assuming applicability, whether `dest_obj` refers back to `src_obj`
    /// via the inverse of `ref_prop`.
    pub fn holds(
        &self,
        src_obj: &Map<String, Value>,
        ref_prop: &str,
        dest_obj: &Map<String, Value>,
    ) -> bool {
        let src_type = object_type(src_obj);
        let Some(src_id) = src_obj.get("id").and_then(Value::as_str) else {
            return false;
        };

        if self.object_type1 == src_type && self.prop_name1 == ref_prop {
            refers_to(dest_obj, self.prop_name2, src_id)
        } else if self.object_type2 == src_type && self.prop_name2 == ref_prop {
            refers_to(dest_obj, self.prop_name1, src_id)
        } else {
            false
        }
    }

    /// Assuming applicability, force a property of `dest_obj` to refer back
    /// to `src_obj`.  For a list-valued inverse property, an arbitrary
    /// element is overwritten.
    pub fn enforce(
        &self,
        src_obj: &Map<String, Value>,
        ref_prop: &str,
        dest_obj: &mut Map<String, Value>,
        rng: &mut dyn RngCore,
    ) {
        let dest_prop = if object_type(src_obj) == self.object_type1 && ref_prop == self.prop_name1
        {
            self.prop_name2
        } else {
            self.prop_name1
        };
        let Some(src_id) = src_obj.get("id").and_then(Value::as_str) else {
            return;
        };

        match dest_obj.get_mut(dest_prop) {
            Some(Value::Array(list)) => {
                if !list.is_empty() {
                    let idx = rng.random_range(0..list.len());
                    list[idx] = Value::String(src_id.to_string());
                }
            }
            Some(slot) => *slot = Value::String(src_id.to_string()),
            None => {}
        }
    }

    fn inverse_of(&self, ref_prop: &str) -> &'static str {
        if self.prop_name1 == ref_prop {
            self.prop_name2
        } else {
            self.prop_name1
        }
    }
}

/// The built-in inverse property pairs.
pub const INVERSE_PROPERTIES: &[InversePropertyConstraint] = &[
    InversePropertyConstraint::new(
        "network-traffic",
        "encapsulates_refs",
        "network-traffic",
        "encapsulated_by_ref",
    ),
    InversePropertyConstraint::new("directory", "contains_refs", "file", "parent_directory_ref"),
    InversePropertyConstraint::new("process", "child_refs", "process", "parent_ref"),
];

fn object_type(obj: &Map<String, Value>) -> &str {
    obj.get("type").and_then(Value::as_str).unwrap_or_default()
}

/// Whether `src_obj` refers to `dest_id` via `ref_prop`.
fn refers_to(src_obj: &Map<String, Value>, ref_prop: &str, dest_id: &str) -> bool {
    match src_obj.get(ref_prop) {
        Some(Value::Array(list)) => list.iter().any(|entry| entry.as_str() == Some(dest_id)),
        Some(value) => value.as_str() == Some(dest_id),
        None => false,
    }
}

/// Whether `dest_id` is reachable from `src_id` following reference edges.
/// Robust to a partially built graph: a reference to an id not present in
/// the graph is treated as unreachable rather than an error.
fn is_reachable(
    src_id: &str,
    dest_id: &str,
    graph: &ObjectGraph,
    visited: &mut HashSet<String>,
) -> bool {
    if src_id == dest_id {
        return true;
    }
    let Some(src_obj) = graph.get(src_id) else {
        return false;
    };
    if !visited.insert(src_id.to_string()) {
        return false;
    }
    find_references(src_obj)
        .iter()
        .any(|(_, ref_id)| is_reachable(ref_id, dest_id, graph, visited))
}

/// Would linking src_type→dest_type via ref_prop require modifying the
/// destination object?  Important for reuse: an object whose properties are
/// already suitably set must not be overwritten, so such an object can't be
/// reused.  This holds even if the instance lacks the inverse property;
/// e.g. two directories claiming to contain the same file make no sense
/// whether or not the file carries parent_directory_ref.
fn would_be_constrained(src_type: &str, ref_prop: &str, dest_type: &str) -> bool {
    INVERSE_PROPERTIES
        .iter()
        .any(|constraint| constraint.is_applicable_types(src_type, ref_prop, dest_type))
}

/// Assuming `src_obj` refers to `dest_obj` via `ref_prop`, enforce all
/// applicable inverse property constraints on `dest_obj`.
fn apply_constraints(
    src_obj: &Map<String, Value>,
    ref_prop: &str,
    dest_obj: &mut Map<String, Value>,
    rng: &mut dyn RngCore,
) {
    for constraint in INVERSE_PROPERTIES {
        if constraint.is_applicable(src_obj, ref_prop, dest_obj) {
            constraint.enforce(src_obj, ref_prop, dest_obj, rng);
        }
    }
}

/// Assuming `src_obj` refers to `dest_obj` via `ref_prop`, remove from
/// `dest_obj` every inverse property that would otherwise have to be
/// constrained, so no back-reference to `src_obj` can exist.
fn delete_inverse_properties(
    src_obj: &Map<String, Value>,
    ref_prop: &str,
    dest_obj: &mut Map<String, Value>,
) {
    for constraint in INVERSE_PROPERTIES {
        if constraint.is_applicable(src_obj, ref_prop, dest_obj) {
            dest_obj.remove(constraint.inverse_of(ref_prop));
        }
    }
}

/// Generates object graphs whose edges are the reference properties of the
/// nodes.  Generation leaves no dangling references in the resulting graph.
pub struct ReferenceGraphGenerator {
    object_generator: ObjectGenerator,
    halt_generator: ObjectGenerator,
    config: RefGraphConfig,
}

impl ReferenceGraphGenerator {
    pub fn new(object_generator: ObjectGenerator, config: RefGraphConfig) -> Self {
        // The graph must not balloon, but generation can't simply stop
        // either, because there must be no dangling references.  Growth
        // control comes from a second generator that minimizes reference
        // properties: fewer reference properties means fewer expansion
        // points.  The normal generator grows the graph; the minimizing one
        // brakes it past the depth limit.
        let mut halt_config = object_generator.config().clone();
        halt_config.minimize_ref_properties = true;
        let halt_generator = object_generator.with_config(halt_config);

        Self {
            object_generator,
            halt_generator,
            config,
        }
    }

    pub fn config(&self) -> &RefGraphConfig {
        &self.config
    }

    /// Generate a reference graph seeded with an object of the given type
    /// (or a random SDO/SCO type if None).  `preexisting` lets new content
    /// connect with existing content instead of forming a disconnected
    /// island.  Returns the seed object's id and the graph.
    pub fn generate(
        &self,
        seed_type: Option<&str>,
        preexisting: Option<ObjectGraph>,
        rng: &mut dyn RngCore,
    ) -> Result<(String, ObjectGraph)> {
        let constraints: Vec<TypeConstraint> = match seed_type {
            Some(seed_type) => vec![seed_type.into()],
            None => vec![TypeClass::Sdo.into(), TypeClass::Sco.into()],
        };
        let seed_type = random_generatable_stix_type(
            self.object_generator.spec_names(),
            &constraints,
            rng,
        )
        .ok_or_else(|| ErrorKind::SeedTypeNotFound {
            constraints: constraints.iter().map(ToString::to_string).collect(),
            version: STIX_VERSION.to_string(),
        })?;

        let mut graph = preexisting.unwrap_or_default();

        let generator = if self.config.max_depth == 0 {
            &self.halt_generator
        } else {
            &self.object_generator
        };
        let seed_object = generate_object(generator, &seed_type, rng)?;
        let seed_id = graph.insert(seed_object)?;

        self.augment_graph(&seed_id, &mut graph, 0, rng)?;

        Ok((seed_id, graph))
    }

    /// Build the graph out from one object: resolve each unresolved
    /// reference property either by creating a new object or by pointing it
    /// at an existing one, per the configured graph type.
    fn augment_graph(
        &self,
        object_id: &str,
        graph: &mut ObjectGraph,
        depth: u32,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let generator = if depth < self.config.max_depth {
            &self.object_generator
        } else {
            &self.halt_generator
        };

        let sites = match graph.get(object_id) {
            Some(obj) => find_reference_sites(obj),
            None => return Ok(()),
        };

        for site in sites {
            // Constrained reference properties will refer to objects
            // already in the graph.  Don't disturb those.
            if graph.contains(&site.id) {
                continue;
            }

            let ref_type = identifier::type_of(&site.id)
                .ok_or_else(|| {
                    GenerationError::invalid_spec(format!(
                        "reference value is not an object id: {}",
                        site.id
                    ))
                })?
                .to_string();

            let mut new_object = None;
            match self.config.graph_type {
                GraphType::Tree => {
                    new_object = Some(generate_object(generator, &ref_type, rng)?);
                }
                GraphType::Dag => {
                    if self.reuse_allowed(graph, object_id, &site.prop, &ref_type, rng) {
                        // Shuffle the candidates so each is tried once with
                        // no preference for earlier ids, and reuse the first
                        // that doesn't close a cycle.
                        let mut candidates = graph.ids_of_type(&ref_type).to_vec();
                        candidates.shuffle(rng);
                        let reusable = candidates.into_iter().find(|candidate| {
                            !is_reachable(candidate, object_id, graph, &mut HashSet::new())
                        });
                        match reusable {
                            Some(candidate) => assign_ref(graph, object_id, &site, &candidate)?,
                            // Every candidate would create a cycle.
                            None => {
                                new_object = Some(generate_object(generator, &ref_type, rng)?);
                            }
                        }
                    } else {
                        new_object = Some(generate_object(generator, &ref_type, rng)?);
                    }
                }
                GraphType::Random => {
                    if self.reuse_allowed(graph, object_id, &site.prop, &ref_type, rng) {
                        let candidate = graph
                            .ids_of_type(&ref_type)
                            .choose(rng)
                            .cloned()
                            .unwrap_or_else(|| site.id.clone());
                        assign_ref(graph, object_id, &site, &candidate)?;
                    } else {
                        new_object = Some(generate_object(generator, &ref_type, rng)?);
                    }
                }
            }

            if let Some(mut new_obj) = new_object {
                let new_id = new_obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        GenerationError::invalid_spec("generated object has no \"id\" property")
                    })?
                    .to_string();

                // Point the source at the new object's id rather than
                // renaming the new object: some objects are generated with
                // fixed, well-known identifiers that must not change.
                assign_ref(graph, object_id, &site, &new_id)?;

                let src_snapshot = graph.get(object_id).cloned().unwrap_or_default();
                match self.config.inverse_property_constraints {
                    InversePolicy::Enforce => {
                        apply_constraints(&src_snapshot, &site.prop, &mut new_obj, rng);
                    }
                    InversePolicy::Delete => {
                        delete_inverse_properties(&src_snapshot, &site.prop, &mut new_obj);
                    }
                    InversePolicy::Ignore => {}
                }

                graph.insert(new_obj)?;
                self.augment_graph(&new_id, graph, depth + 1, rng)?;
            }
        }

        Ok(())
    }

    fn reuse_allowed(
        &self,
        graph: &ObjectGraph,
        object_id: &str,
        ref_prop: &str,
        ref_type: &str,
        rng: &mut dyn RngCore,
    ) -> bool {
        if !graph.has_type(ref_type) {
            return false;
        }
        if rng.random::<f64>() >= self.config.probability_reuse {
            return false;
        }
        if self.config.inverse_property_constraints == InversePolicy::Ignore {
            return true;
        }
        let src_type = graph
            .get(object_id)
            .map(object_type)
            .unwrap_or_default()
            .to_string();
        !would_be_constrained(&src_type, ref_prop, ref_type)
    }
}

fn generate_object(
    generator: &ObjectGenerator,
    spec_name: &str,
    rng: &mut dyn RngCore,
) -> Result<Map<String, Value>> {
    match generator.generate(spec_name, rng)? {
        Value::Object(map) => Ok(map),
        _ => Err(GenerationError::invalid_spec(format!(
            "spec '{spec_name}' did not produce an object"
        ))),
    }
}

fn assign_ref(
    graph: &mut ObjectGraph,
    object_id: &str,
    site: &RefSite,
    new_id: &str,
) -> Result<()> {
    let obj = graph.get_mut(object_id).ok_or_else(|| {
        GenerationError::invalid_spec(format!("object '{object_id}' is not in the graph"))
    })?;
    set_at_path(obj, &site.path, Value::String(new_id.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn applicability_requires_an_actual_reference() {
        let constraint = &INVERSE_PROPERTIES[1]; // directory/file
        let directory = as_map(json!({
            "type": "directory",
            "id": "directory--1",
            "contains_refs": ["file--1"]
        }));
        let file = as_map(json!({
            "type": "file",
            "id": "file--1",
            "parent_directory_ref": "directory--9"
        }));

        assert!(constraint.is_applicable(&directory, "contains_refs", &file));
        assert!(!constraint.holds(&directory, "contains_refs", &file));

        let unrelated = as_map(json!({
            "type": "file",
            "id": "file--2",
            "parent_directory_ref": "directory--9"
        }));
        assert!(!constraint.is_applicable(&directory, "contains_refs", &unrelated));
    }

    #[test]
    fn enforce_points_the_inverse_back() {
        let constraint = &INVERSE_PROPERTIES[1];
        let directory = as_map(json!({
            "type": "directory",
            "id": "directory--1",
            "contains_refs": ["file--1"]
        }));
        let mut file = as_map(json!({
            "type": "file",
            "id": "file--1",
            "parent_directory_ref": "directory--9"
        }));

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        constraint.enforce(&directory, "contains_refs", &mut file, &mut rng);
        assert_eq!(file["parent_directory_ref"], json!("directory--1"));
        assert!(constraint.holds(&directory, "contains_refs", &file));
    }

    #[test]
    fn reachability_tolerates_dangling_references() {
        let graph = ObjectGraph::from_objects(vec![
            json!({"type": "process", "id": "process--1", "parent_ref": "process--2"}),
            json!({"type": "process", "id": "process--2", "parent_ref": "process--missing"}),
        ])
        .unwrap();

        assert!(is_reachable("process--1", "process--2", &graph, &mut HashSet::new()));
        assert!(!is_reachable("process--2", "process--1", &graph, &mut HashSet::new()));
        assert!(!is_reachable(
            "process--1",
            "process--zzz",
            &graph,
            &mut HashSet::new()
        ));
    }

    #[test]
    fn type_level_constraint_check() {
        assert!(would_be_constrained("process", "child_refs", "process"));
        assert!(would_be_constrained("file", "parent_directory_ref", "directory"));
        assert!(!would_be_constrained("identity", "created_by_ref", "identity"));
    }
}
