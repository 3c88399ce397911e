//! Random STIX 2.1 content generation engines.
//!
//! Three layers build on each other: [`ObjectGenerator`] interprets
//! declarative specs into single JSON values, [`ReferenceGraphGenerator`]
//! grows dangling-reference-free object graphs, and [`StixGenerator`]
//! assembles full graphs connected by relationship and sighting objects.

pub mod config;
pub mod graph;
pub mod object;
pub mod ref_graph;
pub mod relationships;
pub mod semantics;
pub mod stix_graph;

pub use config::{
    GraphType, InversePolicy, ObjectGeneratorConfig, RefGraphConfig, StixGeneratorConfig,
};
pub use graph::ObjectGraph;
pub use object::ObjectGenerator;
pub use ref_graph::{InversePropertyConstraint, ReferenceGraphGenerator};
pub use relationships::{Relationship, relationships_for_endpoint};
pub use semantics::{FakerSemantics, SemanticsProvider, StixSemantics};
pub use stix_graph::StixGenerator;
