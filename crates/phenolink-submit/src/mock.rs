//! Mock remote repository and token provider for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let repo = MockRepository::new()
//!     .with_script("abc123", [503, 503, 200])
//!     .with_default_status(201);
//!
//! let outcome = client.submit(&resource).await?;
//! assert_eq!(repo.upsert_count("abc123"), 3);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use phenolink_core::{
    CanonicalResource, Error, ResourceRepository, Result, TokenProvider, UpsertResponse,
};

#[derive(Default)]
struct MockState {
    /// Scripted response statuses per resource id, consumed in order.
    scripts: HashMap<String, VecDeque<u16>>,
    /// Stored resources keyed by client-assigned id (upsert semantics).
    stored: HashMap<String, CanonicalResource>,
    /// Upsert attempts per resource id, successful or not.
    attempts: HashMap<String, u32>,
    /// When set, every unscripted upsert fails at the transport level.
    unreachable: bool,
}

/// In-memory remote repository with scripted failures.
#[derive(Clone)]
pub struct MockRepository {
    state: Arc<Mutex<MockState>>,
    default_status: u16,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            default_status: 200,
        }
    }

    /// Script response statuses for one resource id; once the script is
    /// drained, the default status applies.
    pub fn with_script<I>(self, resource_id: impl Into<String>, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(resource_id.into(), statuses.into_iter().collect());
        self
    }

    /// Status returned for unscripted upserts (default 200).
    pub fn with_default_status(mut self, status: u16) -> Self {
        self.default_status = status;
        self
    }

    /// Make every unscripted upsert fail at the transport level.
    pub fn with_unreachable(self, unreachable: bool) -> Self {
        self.state.lock().unwrap().unreachable = unreachable;
        self
    }

    /// Number of upsert attempts seen for a resource id.
    pub fn upsert_count(&self, resource_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(resource_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct resources currently stored.
    pub fn stored_count(&self) -> usize {
        self.state.lock().unwrap().stored.len()
    }

    /// Stored resource for an id, if any.
    pub fn stored(&self, resource_id: &str) -> Option<CanonicalResource> {
        self.state.lock().unwrap().stored.get(resource_id).cloned()
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceRepository for MockRepository {
    async fn upsert(&self, resource: &CanonicalResource) -> Result<UpsertResponse> {
        let mut state = self.state.lock().unwrap();
        *state
            .attempts
            .entry(resource.resource_id.clone())
            .or_insert(0) += 1;

        let status = match state.scripts.get_mut(&resource.resource_id) {
            Some(script) => script.pop_front().unwrap_or(self.default_status),
            None => {
                if state.unreachable {
                    return Err(Error::Request("connection refused".to_string()));
                }
                self.default_status
            }
        };

        if (200..300).contains(&status) {
            // Keyed insert: re-submission of the same id replaces, never
            // duplicates.
            state
                .stored
                .insert(resource.resource_id.clone(), resource.clone());
        }

        Ok(UpsertResponse { status, body: None })
    }
}

/// Token provider returning a fixed token, counting calls.
pub struct StaticTokenProvider {
    token: String,
    calls: AtomicUsize,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}
