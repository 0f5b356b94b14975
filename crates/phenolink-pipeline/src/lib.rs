//! # phenolink-pipeline
//!
//! Orchestrates the full run: streaming ingestion, concurrent term
//! resolution and resource building, authenticated submission, and
//! batch-level checkpointing for resumable runs.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use phenolink_core::RunConfig;
//! use phenolink_ingest::ExpectedSchema;
//! use phenolink_ontology::{OntologyIndex, OntologySource};
//! use phenolink_pipeline::{FileCheckpointStore, PipelineBuilder};
//! use phenolink_resolve::ResourceSchema;
//!
//! let index = Arc::new(OntologyIndex::build(&sources)?);
//! let pipeline = PipelineBuilder::new(
//!     index,
//!     ExpectedSchema::new(["patient_id", "phenotype"]),
//!     ResourceSchema::new("patient_id", vec!["phenotype".into()]),
//!     repository,
//!     Arc::new(FileCheckpointStore::new("checkpoint.json")),
//! )
//! .with_config(RunConfig::from_env())
//! .build();
//!
//! let summary = pipeline.run(Path::new("records.csv")).await?;
//! ```

pub mod checkpoint;
pub mod orchestrator;

pub use checkpoint::FileCheckpointStore;
pub use orchestrator::{CancelHandle, Pipeline, PipelineBuilder, PipelineEvent};
