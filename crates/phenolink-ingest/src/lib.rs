//! # phenolink-ingest
//!
//! Streaming tabular ingestion: rows come off the source lazily, are
//! validated against a fixed expected schema, and surface as
//! [`phenolink_core::RawRecord`]s. Restartable from a row offset for
//! checkpoint resumption.

pub mod schema;
pub mod stream;

pub use schema::ExpectedSchema;
pub use stream::RecordStream;
