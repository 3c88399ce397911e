use std::collections::HashMap;

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use serde_json::{Map, Value};

use stixgen_core::error::ErrorKind;
use stixgen_core::stix_types::{is_sco, is_sdo};
use stixgen_core::{
    GenerationError, Result, STIX_VERSION, TypeClass, TypeConstraint, find_reference_sites,
    identifier, is_stix_type, random_generatable_stix_type, set_at_path,
};

use crate::config::{RefGraphConfig, StixGeneratorConfig};
use crate::graph::ObjectGraph;
use crate::object::ObjectGenerator;
use crate::ref_graph::ReferenceGraphGenerator;
use crate::relationships::{Relationship, relationships_for_endpoint};

/// Generates STIX content: objects related by SROs (relationships and
/// sightings) and embedded references.
pub struct StixGenerator {
    object_generator: ObjectGenerator,
    ref_graph_generator: ReferenceGraphGenerator,
    config: StixGeneratorConfig,
}

impl StixGenerator {
    /// Build a STIX generator.  If no reference graph generator is given,
    /// one with default settings is created over the same object generator.
    pub fn new(
        object_generator: ObjectGenerator,
        ref_graph_generator: Option<ReferenceGraphGenerator>,
        config: StixGeneratorConfig,
    ) -> Self {
        let ref_graph_generator = ref_graph_generator.unwrap_or_else(|| {
            ReferenceGraphGenerator::new(object_generator.clone(), RefGraphConfig::default())
        });
        Self {
            object_generator,
            ref_graph_generator,
            config,
        }
    }

    /// Build the whole stack over the bundled registry.
    pub fn builtin(
        object_config: crate::config::ObjectGeneratorConfig,
        ref_graph_config: RefGraphConfig,
        config: StixGeneratorConfig,
        extra_specs: Option<&Value>,
        stix_version: &str,
    ) -> Result<Self> {
        let object_generator = ObjectGenerator::builtin(object_config, extra_specs, stix_version)?;
        let ref_graph_generator =
            ReferenceGraphGenerator::new(object_generator.clone(), ref_graph_config);
        Ok(Self::new(
            object_generator,
            Some(ref_graph_generator),
            config,
        ))
    }

    pub fn config(&self) -> &StixGeneratorConfig {
        &self.config
    }

    /// Generate a STIX graph seeded with an object of the given type (a
    /// random SDO if None).  `preexisting` lets new content connect with
    /// existing content instead of forming a disconnected island.
    pub fn generate(
        &self,
        seed_type: Option<&str>,
        preexisting: Option<ObjectGraph>,
        rng: &mut dyn RngCore,
    ) -> Result<ObjectGraph> {
        let constraints: Vec<TypeConstraint> = match seed_type {
            Some(seed_type) => vec![seed_type.into()],
            None => vec![TypeClass::Sdo.into()],
        };
        let seed_type = self.random_stix_type(&constraints, rng)?;

        let mut graph = preexisting.unwrap_or_default();

        let seed_object = self.generate_object(&seed_type, rng)?;
        let seed_id = graph.insert(seed_object)?;
        if self.config.complete_ref_properties {
            self.complete_ref_properties(&seed_id, &mut graph, rng)?;
        }

        // Without an SRO-connectable object there is nothing to relate.
        if graph.types().any(is_sro_connectable) {
            let relationship_count =
                rng.random_range(self.config.min_relationships..=self.config.max_relationships);

            for _ in 0..relationship_count {
                let mut sighting_added = false;
                if rng.random::<f64>() < self.config.probability_sighting {
                    sighting_added = self.add_sighting(&mut graph, rng)?;
                }

                // A sighting isn't always possible; fall back to a plain SRO.
                if !sighting_added {
                    // Reusing the single existing node would form a
                    // self-loop, so inhibit reuse in that case.
                    if rng.random::<f64>() < self.config.probability_reuse && graph.len() > 1 {
                        self.add_sro_reuse(&mut graph, rng)?;
                    } else {
                        self.add_sro_new(&mut graph, rng)?;
                    }
                }
            }
        }

        Ok(graph)
    }

    fn random_stix_type(
        &self,
        constraints: &[TypeConstraint],
        rng: &mut dyn RngCore,
    ) -> Result<String> {
        random_generatable_stix_type(self.object_generator.spec_names(), constraints, rng)
            .ok_or_else(|| {
                ErrorKind::SeedTypeNotFound {
                    constraints: constraints.iter().map(ToString::to_string).collect(),
                    version: STIX_VERSION.to_string(),
                }
                .into()
            })
    }

    fn generate_object(
        &self,
        spec_name: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Map<String, Value>> {
        match self.object_generator.generate(spec_name, rng)? {
            Value::Object(map) => Ok(map),
            _ => Err(GenerationError::invalid_spec(format!(
                "spec '{spec_name}' did not produce an object"
            ))),
        }
    }

    /// Resolve all dangling reference properties of a graph object by
    /// generating reference sub-graphs for them.  Routing through the
    /// reference graph generator handles inverse property constraints and
    /// keeps the result semantically sensible; SRO endpoint properties are
    /// the one place a simpler substitution is safe, and they're handled
    /// directly by the SRO builders.
    fn complete_ref_properties(
        &self,
        object_id: &str,
        graph: &mut ObjectGraph,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let sites = match graph.get(object_id) {
            Some(obj) => find_reference_sites(obj),
            None => return Ok(()),
        };

        for site in sites {
            // Don't disturb references already pointing at graph members.
            if graph.contains(&site.id) {
                continue;
            }
            let stix_type = identifier::type_of(&site.id)
                .ok_or_else(|| {
                    GenerationError::invalid_spec(format!(
                        "reference value is not an object id: {}",
                        site.id
                    ))
                })?
                .to_string();

            let seed_id = self.make_ref_graph(&stix_type, graph, rng)?;
            if let Some(obj) = graph.get_mut(object_id) {
                set_at_path(obj, &site.path, Value::String(seed_id));
            }
        }
        Ok(())
    }

    /// Grow a reference graph seeded with the given type into the current
    /// graph, returning the seed object's id.
    fn make_ref_graph(
        &self,
        seed_type: &str,
        graph: &mut ObjectGraph,
        rng: &mut dyn RngCore,
    ) -> Result<String> {
        let (seed_id, merged) = self.ref_graph_generator.generate(
            Some(seed_type),
            Some(std::mem::take(graph)),
            rng,
        )?;
        *graph = merged;
        Ok(seed_id)
    }

    /// An id of a type satisfying the constraints, randomly either reused
    /// from the graph or a freshly created object (whose references are then
    /// resolved per config).
    fn random_get_id(
        &self,
        graph: &mut ObjectGraph,
        constraints: &[TypeConstraint],
        rng: &mut dyn RngCore,
    ) -> Result<String> {
        if rng.random::<f64>() < self.config.probability_reuse
            && let Some(id) = random_id_of_types(graph, constraints, rng)
        {
            return Ok(id);
        }

        // No existing id satisfies the constraints, or reuse wasn't chosen.
        let stix_type = self.random_stix_type(constraints, rng)?;
        let object = self.generate_object(&stix_type, rng)?;
        let id = graph.insert(object)?;
        if self.config.complete_ref_properties {
            self.complete_ref_properties(&id, graph, rng)?;
        }
        Ok(id)
    }

    /// Fill out a reference list: entries already naming graph members stay,
    /// others are replaced with same-typed ids that randomly reuse existing
    /// content or name new objects.
    fn random_ref_list(
        &self,
        ref_list: &mut [Value],
        graph: &mut ObjectGraph,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        for slot in ref_list.iter_mut() {
            let Some(ref_id) = slot.as_str().map(str::to_string) else {
                continue;
            };
            if graph.contains(&ref_id) {
                continue;
            }
            let stix_type = identifier::type_of(&ref_id)
                .ok_or_else(|| {
                    GenerationError::invalid_spec(format!(
                        "reference value is not an object id: {ref_id}"
                    ))
                })?
                .to_string();
            let new_id = self.random_get_id(graph, &[stix_type.as_str().into()], rng)?;
            *slot = Value::String(new_id);
        }
        Ok(())
    }

    /// Try to add a sighting.  All new content must connect to existing
    /// content, and a sighting's connection points are constrained in what
    /// they may refer to, so this fails when no SDO exists in the graph (a
    /// plain relationship always has the "related-to" fallback; a sighting
    /// has none).
    fn add_sighting(&self, graph: &mut ObjectGraph, rng: &mut dyn RngCore) -> Result<bool> {
        if !graph.types().any(is_sdo) {
            return Ok(false);
        }

        let mut sighting = self.generate_object("sighting", rng)?;

        // Three ways to connect to the existing graph: observed_data_refs,
        // where_sighted_refs, and sighting_of_ref.  The last always works
        // since at least one SDO exists, but be random about it as far as
        // that's possible.
        let observed_len = sighting
            .get("observed_data_refs")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let where_len = sighting
            .get("where_sighted_refs")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        if rng.random::<f64>() < 0.33 && observed_len > 0 && graph.has_type("observed-data") {
            let idx = rng.random_range(0..observed_len);
            if let Some(id) = random_id_of_types(graph, &["observed-data".into()], rng)
                && let Some(Value::Array(list)) = sighting.get_mut("observed_data_refs")
            {
                list[idx] = Value::String(id);
            }
        } else if rng.random::<f64>() < 0.5
            && where_len > 0
            && (graph.has_type("identity") || graph.has_type("location"))
        {
            let idx = rng.random_range(0..where_len);
            if let Some(id) =
                random_id_of_types(graph, &["identity".into(), "location".into()], rng)
                && let Some(Value::Array(list)) = sighting.get_mut("where_sighted_refs")
            {
                list[idx] = Value::String(id);
            }
        } else if let Some(id) = random_id_of_types(graph, &[TypeClass::Sdo.into()], rng) {
            sighting.insert("sighting_of_ref".to_string(), Value::String(id));
        }

        // Whatever connection was made, sighting_of_ref must resolve.
        let sighting_of_dangling = sighting
            .get("sighting_of_ref")
            .and_then(Value::as_str)
            .is_none_or(|id| !graph.contains(id));
        if sighting_of_dangling {
            let id = self.random_get_id(graph, &[TypeClass::Sdo.into()], rng)?;
            sighting.insert("sighting_of_ref".to_string(), Value::String(id));
        }

        // The remaining list entries randomly may or may not connect to
        // existing graph nodes.
        for prop in ["observed_data_refs", "where_sighted_refs"] {
            if let Some(Value::Array(mut list)) = sighting.remove(prop) {
                self.random_ref_list(&mut list, graph, rng)?;
                sighting.insert(prop.to_string(), Value::Array(list));
            }
        }

        let sighting_id = graph.insert(sighting)?;
        if self.config.complete_ref_properties {
            self.complete_ref_properties(&sighting_id, graph, rng)?;
        }

        Ok(true)
    }

    /// Add an SRO connecting two existing nodes.
    fn add_sro_reuse(&self, graph: &mut ObjectGraph, rng: &mut dyn RngCore) -> Result<()> {
        let endpoint_id1 = random_sro_connectable_id(graph, rng).ok_or_else(|| {
            GenerationError::invalid_spec("no SRO-connectable object in the graph")
        })?;
        let endpoint_type1 = identifier::type_of(&endpoint_id1).unwrap_or_default().to_string();

        // Choose a uniformly random id over all ids connectable to
        // endpoint 1.  Choosing a relationship first and then an id would
        // bias toward types with many relationship entries.
        let mut reverse_rels: HashMap<&str, Vec<&'static Relationship>> = HashMap::new();
        for rel in relationships_for_endpoint(&endpoint_type1) {
            let other_type = if endpoint_type1 == rel.src_type {
                rel.target_type
            } else {
                rel.src_type
            };
            reverse_rels.entry(other_type).or_default().push(rel);
        }
        let other_type_constraints: Vec<TypeConstraint> =
            reverse_rels.keys().map(|name| (*name).into()).collect();

        let sro = match random_id_of_types(graph, &other_type_constraints, rng) {
            Some(endpoint_id2) => {
                let endpoint_type2 =
                    identifier::type_of(&endpoint_id2).unwrap_or_default().to_string();
                let rel = reverse_rels
                    .get(endpoint_type2.as_str())
                    .and_then(|rels| rels.choose(rng))
                    .ok_or_else(|| {
                        GenerationError::invalid_spec(format!(
                            "no relationship connects '{endpoint_type1}' and '{endpoint_type2}'"
                        ))
                    })?;
                self.make_sro(
                    rel,
                    &endpoint_id1,
                    &endpoint_id2,
                    &endpoint_type1,
                    &endpoint_type2,
                    rng,
                )?
            }
            None => {
                // No typed relationship connects endpoint 1 to any other
                // node; relate it to a random node generically.
                let endpoint_id2 = random_sro_connectable_id(graph, rng).ok_or_else(|| {
                    GenerationError::invalid_spec("no SRO-connectable object in the graph")
                })?;
                self.make_related_to_sro(&endpoint_id1, &endpoint_id2, rng)?
            }
        };

        let sro_id = graph.insert(sro)?;
        if self.config.complete_ref_properties {
            self.complete_ref_properties(&sro_id, graph, rng)?;
        }
        Ok(())
    }

    /// Add an SRO connecting an existing node to a newly generated one.
    fn add_sro_new(&self, graph: &mut ObjectGraph, rng: &mut dyn RngCore) -> Result<()> {
        let endpoint_id1 = random_sro_connectable_id(graph, rng).ok_or_else(|| {
            GenerationError::invalid_spec("no SRO-connectable object in the graph")
        })?;
        let endpoint_type1 = identifier::type_of(&endpoint_id1).unwrap_or_default().to_string();

        let rels = relationships_for_endpoint(&endpoint_type1);
        let (endpoint_object2, sro) = match rels.choose(rng) {
            Some(rel) => {
                let endpoint_type2 = if endpoint_type1 == rel.src_type {
                    rel.target_type
                } else {
                    rel.src_type
                };
                let endpoint_object2 = self.generate_object(endpoint_type2, rng)?;
                let endpoint_id2 = object_id(&endpoint_object2)?;
                let sro = self.make_sro(
                    rel,
                    &endpoint_id1,
                    &endpoint_id2,
                    &endpoint_type1,
                    endpoint_type2,
                    rng,
                )?;
                (endpoint_object2, sro)
            }
            None => {
                // No SRO can connect endpoint 1 to *any* type; fall back to
                // related-to with a random type.
                let endpoint_type2 = self.random_stix_type(
                    &[TypeClass::Sdo.into(), TypeClass::Sco.into()],
                    rng,
                )?;
                let endpoint_object2 = self.generate_object(&endpoint_type2, rng)?;
                let endpoint_id2 = object_id(&endpoint_object2)?;
                let sro = self.make_related_to_sro(&endpoint_id1, &endpoint_id2, rng)?;
                (endpoint_object2, sro)
            }
        };

        let endpoint_id2 = graph.insert(endpoint_object2)?;
        let sro_id = graph.insert(sro)?;
        if self.config.complete_ref_properties {
            self.complete_ref_properties(&sro_id, graph, rng)?;
            self.complete_ref_properties(&endpoint_id2, graph, rng)?;
        }
        Ok(())
    }

    /// Make an SRO of the relationship's type connecting the two ids.
    /// With equal endpoint types the SRO could point either way, so the
    /// direction is chosen at random; otherwise it follows the
    /// relationship's declared source and target roles.
    fn make_sro(
        &self,
        rel: &Relationship,
        id1: &str,
        id2: &str,
        type1: &str,
        type2: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Map<String, Value>> {
        let (source_ref, target_ref) = if type1 == type2 {
            if rng.random_bool(0.5) { (id2, id1) } else { (id1, id2) }
        } else if type1 == rel.src_type {
            (id1, id2)
        } else {
            (id2, id1)
        };

        let mut sro = self.generate_object("relationship", rng)?;
        sro.insert("source_ref".to_string(), Value::String(source_ref.to_string()));
        sro.insert("target_ref".to_string(), Value::String(target_ref.to_string()));
        sro.insert(
            "relationship_type".to_string(),
            Value::String(rel.rel_type.to_string()),
        );
        Ok(sro)
    }

    /// Make a generic "related-to" SRO with random directionality.
    fn make_related_to_sro(
        &self,
        id1: &str,
        id2: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Map<String, Value>> {
        let (source_ref, target_ref) = if rng.random_bool(0.5) { (id2, id1) } else { (id1, id2) };

        let mut sro = self.generate_object("relationship", rng)?;
        sro.insert("source_ref".to_string(), Value::String(source_ref.to_string()));
        sro.insert("target_ref".to_string(), Value::String(target_ref.to_string()));
        sro.insert(
            "relationship_type".to_string(),
            Value::String("related-to".to_string()),
        );
        Ok(sro)
    }
}

fn object_id(object: &Map<String, Value>) -> Result<String> {
    object
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationError::invalid_spec("generated object has no \"id\" property"))
}

fn is_sro_connectable(stix_type: &str) -> bool {
    is_sdo(stix_type) || is_sco(stix_type)
}

/// A uniformly random id among all graph ids matching the constraints.
/// Uniform over ids, not over types: choosing a type first would skew
/// toward sparsely populated types.
fn random_id_of_types(
    graph: &ObjectGraph,
    constraints: &[TypeConstraint],
    rng: &mut dyn RngCore,
) -> Option<String> {
    let candidates: Vec<&str> = graph
        .types()
        .filter(|stix_type| is_stix_type(stix_type, constraints))
        .flat_map(|stix_type| graph.ids_of_type(stix_type).iter().map(String::as_str))
        .collect();
    candidates.choose(rng).map(|id| (*id).to_string())
}

fn random_sro_connectable_id(graph: &ObjectGraph, rng: &mut dyn RngCore) -> Option<String> {
    random_id_of_types(
        graph,
        &[TypeClass::Sdo.into(), TypeClass::Sco.into()],
        rng,
    )
}
