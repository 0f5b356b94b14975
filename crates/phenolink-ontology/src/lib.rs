//! # phenolink-ontology
//!
//! Ontology source parsing and the read-only in-memory concept index.
//!
//! Supports OBO flat files and OWL RDF/XML releases. The index is built
//! once at run start and shared read-only by all resolver workers.

pub mod index;
pub mod obo;
pub mod owl;

pub use index::{OntologyIndex, OntologySource};
