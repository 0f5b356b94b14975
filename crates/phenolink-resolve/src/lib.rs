//! # phenolink-resolve
//!
//! Term resolution and canonical resource assembly. The resolver consults
//! the shared ontology index; the builder is a pure function from a record
//! and its resolved terms to a submission-ready resource.

pub mod builder;
pub mod resolver;

pub use builder::{derive_resource_id, ResourceBuilder, ResourceSchema};
pub use resolver::Resolver;
