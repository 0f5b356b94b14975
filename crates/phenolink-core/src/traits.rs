//! Seam traits between pipeline stages and external collaborators.
//!
//! The identity provider, remote repository, and checkpoint store are
//! consumed through these narrow interfaces so stages can be exercised
//! against in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CanonicalResource, PipelineCheckpoint};

/// Supplies bearer tokens for authenticated submission.
///
/// Implementations cache and refresh; callers just ask for a token that is
/// valid right now.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token currently valid for the remote repository.
    async fn bearer_token(&self) -> Result<String>;
}

/// Response from one upsert attempt against the remote repository.
///
/// Transport-level failures surface as `Err`; any HTTP response, success or
/// not, comes back as `Ok` with its status for the caller to classify.
#[derive(Debug, Clone)]
pub struct UpsertResponse {
    /// HTTP status code of the response.
    pub status: u16,
    /// Response body, when the repository returned one.
    pub body: Option<String>,
}

impl UpsertResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote repository accepting resource submissions keyed by client-assigned
/// identifier, with upsert semantics for retried submissions.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Submit a resource; repeating the same `resource_id` never creates a
    /// duplicate on the remote side.
    async fn upsert(&self, resource: &CanonicalResource) -> Result<UpsertResponse>;
}

/// Small persisted progress record, read once at run start and written after
/// each completed batch.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last checkpoint, if one exists.
    async fn load(&self) -> Result<Option<PipelineCheckpoint>>;

    /// Persist a checkpoint. Implementations must reject offsets that move
    /// backwards within a run.
    async fn save(&self, checkpoint: &PipelineCheckpoint) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_response_success_range() {
        assert!(UpsertResponse {
            status: 200,
            body: None
        }
        .is_success());
        assert!(UpsertResponse {
            status: 201,
            body: None
        }
        .is_success());
        assert!(UpsertResponse {
            status: 299,
            body: None
        }
        .is_success());
        assert!(!UpsertResponse {
            status: 400,
            body: None
        }
        .is_success());
        assert!(!UpsertResponse {
            status: 503,
            body: None
        }
        .is_success());
    }
}
