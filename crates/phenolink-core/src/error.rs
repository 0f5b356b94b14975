//! Error types for the phenolink pipeline.

use thiserror::Error;

/// Result type alias using phenolink's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for phenolink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An ontology source could not be parsed into concepts.
    #[error("Malformed ontology source: {0}")]
    MalformedOntology(String),

    /// Two ontology sources assigned the same identifier to conflicting labels.
    #[error("Duplicate concept {id}: \"{existing}\" conflicts with \"{conflicting}\"")]
    DuplicateConcept {
        id: String,
        existing: String,
        conflicting: String,
    },

    /// The tabular source cannot be read at all (corrupt file, no header).
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    /// A single row failed schema validation. Row-scoped; never aborts the run.
    #[error("Row {row} invalid: {message}")]
    RowValidation { row: u64, message: String },

    /// A mandatory coded field was left unresolved. Resource-scoped.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Credential acquisition or refresh failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP/network request failed.
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint store read/write failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error aborts the run.
    ///
    /// Row- and resource-scoped failures accumulate into the run summary;
    /// only source, ontology-build, authentication, and checkpoint failures
    /// are run-fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::RowValidation { .. } | Error::SchemaViolation(_) | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
