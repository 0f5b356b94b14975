//! Centralized default constants for the phenolink pipeline.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// TERM RESOLUTION
// =============================================================================

/// Minimum Jaro-Winkler similarity for a fuzzy match to count as resolved.
///
/// 0.85 keeps single-token typos ("siezure" → "Seizure") while excluding
/// merely related terms; clinical labels cluster tightly enough that a lower
/// floor produces false concept assignments.
pub const SIMILARITY_THRESHOLD: f32 = 0.85;

/// Maximum fuzzy candidates returned per lookup.
pub const FUZZY_CANDIDATE_LIMIT: usize = 5;

// =============================================================================
// SUBMISSION
// =============================================================================

/// Default maximum submission attempts per resource (first try included).
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Exponential backoff base delay in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 500;

/// Backoff ceiling in milliseconds (30 s).
pub const BACKOFF_MAX_MS: u64 = 30_000;

/// Timeout for a single submission request in seconds.
pub const SUBMIT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// Timeout for token endpoint requests in seconds.
pub const TOKEN_TIMEOUT_SECS: u64 = 15;

/// Refresh the cached token this many seconds before its expiry.
///
/// Wide enough that a token never expires mid-submission at the default
/// request timeout, narrow enough to avoid hammering the provider.
pub const TOKEN_REFRESH_LEEWAY_SECS: u64 = 60;

/// Fallback token lifetime when the provider omits `expires_in`.
pub const TOKEN_DEFAULT_LIFETIME_SECS: u64 = 3600;

// =============================================================================
// PIPELINE
// =============================================================================

/// Resources per checkpointed batch.
pub const BATCH_SIZE: usize = 50;

/// Bounded queue capacity between pipeline stages.
///
/// Two batches of headroom: the producer can fill the next batch while the
/// consumer drains the current one, without unbounded growth.
pub const QUEUE_CAPACITY: usize = 2 * BATCH_SIZE;

/// Concurrent resolver/builder workers per batch.
pub const RESOLVER_WORKERS: usize = 4;

/// Concurrent submission workers per batch.
pub const SUBMIT_WORKERS: usize = 4;

/// Pipeline event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_threshold_in_unit_interval() {
        assert!((0.0..=1.0).contains(&SIMILARITY_THRESHOLD));
    }

    #[test]
    fn backoff_bounds_consistent() {
        const {
            assert!(BACKOFF_BASE_MS < BACKOFF_MAX_MS);
            assert!(MAX_RETRY_ATTEMPTS >= 1);
        }
    }

    #[test]
    fn queue_holds_at_least_one_batch() {
        const {
            assert!(QUEUE_CAPACITY >= BATCH_SIZE);
        }
    }

    #[test]
    fn refresh_leeway_shorter_than_default_lifetime() {
        const {
            assert!(TOKEN_REFRESH_LEEWAY_SECS < TOKEN_DEFAULT_LIFETIME_SECS);
        }
    }
}
