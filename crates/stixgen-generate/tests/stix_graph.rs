use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use stixgen_core::{find_references, identifier};
use stixgen_generate::{
    ObjectGeneratorConfig, ObjectGraph, RefGraphConfig, StixGenerator, StixGeneratorConfig,
    relationships_for_endpoint,
};

fn stix_generator(config: StixGeneratorConfig) -> StixGenerator {
    StixGenerator::builtin(
        ObjectGeneratorConfig::default(),
        RefGraphConfig::default(),
        config,
        None,
        "2.1",
    )
    .expect("builtin registry")
}

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

fn sro_count(graph: &ObjectGraph) -> usize {
    graph.ids_of_type("relationship").len() + graph.ids_of_type("sighting").len()
}

#[test]
fn generated_graphs_are_fully_resolved() {
    let generator = stix_generator(StixGeneratorConfig::default());
    for seed in 0..5 {
        let mut rng = rng(40 + seed);
        let graph = generator.generate(None, None, &mut rng).unwrap();
        for (id, object) in graph.iter() {
            for (prop, ref_id) in find_references(object) {
                assert!(
                    graph.contains(&ref_id),
                    "{id}.{prop} dangles: {ref_id}"
                );
            }
        }
    }
}

#[test]
fn relationship_count_is_within_the_configured_range() {
    let mut config = StixGeneratorConfig::default();
    config.min_relationships = 2;
    config.max_relationships = 4;
    let generator = stix_generator(config);
    for seed in 0..5 {
        let mut rng = rng(50 + seed);
        let graph = generator.generate(None, None, &mut rng).unwrap();
        let count = sro_count(&graph);
        assert!((2..=4).contains(&count), "unexpected SRO count {count}");
    }
}

#[test]
fn typed_relationships_respect_the_compatibility_table() {
    let generator = stix_generator(StixGeneratorConfig::default());
    let mut rng = rng(60);
    let mut typed_checked = 0;

    for _ in 0..10 {
        let graph = generator.generate(None, None, &mut rng).unwrap();
        for sro_id in graph.ids_of_type("relationship") {
            let sro = graph.get(sro_id).unwrap();
            let rel_type = sro["relationship_type"].as_str().unwrap();
            let source_ref = sro["source_ref"].as_str().unwrap();
            let target_ref = sro["target_ref"].as_str().unwrap();
            assert!(graph.contains(source_ref));
            assert!(graph.contains(target_ref));

            if rel_type == "related-to" {
                continue;
            }
            let src_type = identifier::type_of(source_ref).unwrap();
            let target_type = identifier::type_of(target_ref).unwrap();
            assert!(
                relationships_for_endpoint(src_type).iter().any(|rel| {
                    rel.rel_type == rel_type
                        && rel.src_type == src_type
                        && rel.target_type == target_type
                }),
                "table has no entry for {src_type} -{rel_type}-> {target_type}"
            );
            typed_checked += 1;
        }
    }
    assert!(typed_checked > 0, "no typed relationships were produced");
}

#[test]
fn seed_type_is_honored() {
    let generator = stix_generator(StixGeneratorConfig::default());
    let mut rng = rng(70);
    let graph = generator.generate(Some("malware"), None, &mut rng).unwrap();
    assert!(graph.has_type("malware"));
}

#[test]
fn sightings_are_attempted_when_probable() {
    let mut config = StixGeneratorConfig::default();
    config.probability_sighting = 1.0;
    config.min_relationships = 4;
    config.max_relationships = 6;
    let generator = stix_generator(config);

    let mut sightings = 0;
    for seed in 0..5 {
        let mut rng = rng(80 + seed);
        let graph = generator.generate(None, None, &mut rng).unwrap();
        sightings += graph.ids_of_type("sighting").len();

        for sighting_id in graph.ids_of_type("sighting") {
            let sighting = graph.get(sighting_id).unwrap();
            let sighting_of = sighting["sighting_of_ref"].as_str().unwrap();
            assert!(graph.contains(sighting_of));
        }
    }
    assert!(sightings > 0, "no sightings with probability 1.0");
}

#[test]
fn preexisting_content_is_incorporated() {
    let preexisting = ObjectGraph::from_objects(vec![json!({
        "type": "tool",
        "id": "tool--00000000-0000-4000-8000-00000000abcd",
        "name": "existing-tool",
        "spec_version": "2.1",
        "created": "2024-01-01T00:00:00Z",
        "modified": "2024-01-02T00:00:00Z"
    })])
    .unwrap();

    let generator = stix_generator(StixGeneratorConfig::default());
    let mut rng = rng(90);
    let graph = generator
        .generate(Some("indicator"), Some(preexisting), &mut rng)
        .unwrap();

    assert!(graph.contains("tool--00000000-0000-4000-8000-00000000abcd"));
    assert!(graph.has_type("indicator"));
    assert!(
        !graph
            .new_ids()
            .contains(&"tool--00000000-0000-4000-8000-00000000abcd".to_string())
    );
}

#[test]
fn unresolved_references_stay_put_without_completion() {
    let mut config = StixGeneratorConfig::default();
    config.complete_ref_properties = false;
    config.min_relationships = 1;
    config.max_relationships = 2;
    let generator = stix_generator(config);

    let mut rng = rng(95);
    // SRO endpoints are still resolved (they connect to graph content by
    // construction), but e.g. a sighting's sighting_of_ref may dangle
    let graph = generator.generate(None, None, &mut rng).unwrap();
    for sro_id in graph.ids_of_type("relationship") {
        let sro = graph.get(sro_id).unwrap();
        assert!(graph.contains(sro["source_ref"].as_str().unwrap()));
        assert!(graph.contains(sro["target_ref"].as_str().unwrap()));
    }
}
