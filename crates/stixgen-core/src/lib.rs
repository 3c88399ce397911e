//! Core contracts and helpers for stixgen.
//!
//! This crate defines the specification data model, the spec registry with
//! its bundled STIX 2.1 asset, constraint types, identifier and reference
//! helpers shared by the generation engines.

pub mod constraints;
pub mod error;
pub mod identifier;
pub mod json_type;
pub mod references;
pub mod registry;
pub mod spec;
pub mod stix_types;

pub use constraints::{
    CmpOp, PresenceCoconstraint, PresenceMode, ValueCoconstraint, ValueConstraint, is_ref_prop,
};
pub use error::{ErrorKind, GenerationError, Result};
pub use json_type::JsonType;
pub use references::{PathStep, RefSite, find_reference_sites, find_references, set_at_path};
pub use registry::{SpecRegistry, deep_merge};
pub use spec::{SEMANTIC_PROPERTY_NAME, SpecShape, classify, spec_type};
pub use stix_types::{TypeClass, TypeConstraint, is_stix_type, random_generatable_stix_type};

/// STIX specification version the bundled registry and type tables target.
pub const STIX_VERSION: &str = "2.1";
