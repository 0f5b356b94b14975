//! # phenolink-core
//!
//! Core types, traits, and abstractions for the phenolink pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other phenolink crates depend on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::RunConfig;
pub use error::{Error, Result};
pub use models::*;
pub use traits::{CheckpointStore, ResourceRepository, TokenProvider, UpsertResponse};
