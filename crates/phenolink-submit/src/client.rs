//! Submission state machine with retry, backoff, and idempotency.
//!
//! Each submission attempt moves through authenticate → submit → classify:
//! a success response finalizes the outcome as accepted, a permanent
//! rejection is never retried, and transient failures reschedule with
//! exponential backoff and jitter until the attempt ceiling moves the
//! resource to abandoned. Resources carry client-assigned identifiers, so
//! a retried submission upserts rather than duplicates.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use phenolink_core::{
    CanonicalResource, Error, ResourceRepository, Result, SubmissionOutcome, SubmissionStatus,
};

/// Classification of one upsert response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remote acknowledged; terminal success.
    Accepted,
    /// Permanent validation failure; terminal, never retried.
    Rejected,
    /// Worth another attempt after backoff.
    Transient,
}

/// Classify an HTTP status per the retry contract: 2xx accepted, 408/429
/// and 5xx transient, any other status a permanent rejection.
pub fn classify_status(status: u16) -> Disposition {
    match status {
        200..=299 => Disposition::Accepted,
        408 | 429 => Disposition::Transient,
        500..=599 => Disposition::Transient,
        _ => Disposition::Rejected,
    }
}

/// Retry tuning for the submission client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per resource, first try included.
    pub max_attempts: u32,
    /// Exponential backoff base in milliseconds.
    pub base_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: phenolink_core::defaults::MAX_RETRY_ATTEMPTS,
            base_ms: phenolink_core::defaults::BACKOFF_BASE_MS,
            max_ms: phenolink_core::defaults::BACKOFF_MAX_MS,
        }
    }
}

/// Deterministic backoff ceiling for the given completed attempt (1-based):
/// `base * 2^(attempt-1)`, clamped to `max_ms`.
pub fn backoff_ceiling_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    base_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(max_ms)
}

/// Full-jitter backoff delay: uniform in `[0, ceiling]`.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let ceiling = backoff_ceiling_ms(attempt, policy.base_ms, policy.max_ms);
    let jittered = rand::thread_rng().gen_range(0..=ceiling);
    Duration::from_millis(jittered)
}

/// Submits resources to the remote repository, driving each through the
/// attempt state machine until it reaches a terminal status.
pub struct SubmissionClient {
    repository: Arc<dyn ResourceRepository>,
    policy: RetryPolicy,
}

impl SubmissionClient {
    pub fn new(repository: Arc<dyn ResourceRepository>, policy: RetryPolicy) -> Self {
        Self { repository, policy }
    }

    /// Submit one resource to a terminal outcome.
    ///
    /// `Ok` always carries a terminal [`SubmissionOutcome`] (accepted,
    /// rejected, or abandoned); `Err` is reserved for run-fatal
    /// authentication failures.
    pub async fn submit(&self, resource: &CanonicalResource) -> Result<SubmissionOutcome> {
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.repository.upsert(resource).await {
                Ok(response) => match classify_status(response.status) {
                    Disposition::Accepted => {
                        debug!(
                            resource_id = %resource.resource_id,
                            attempt,
                            "Resource accepted"
                        );
                        return Ok(SubmissionOutcome {
                            resource_id: resource.resource_id.clone(),
                            status: SubmissionStatus::Accepted,
                            attempts: attempt,
                            last_error: None,
                        });
                    }
                    Disposition::Rejected => {
                        info!(
                            resource_id = %resource.resource_id,
                            status = response.status,
                            "Resource rejected by remote repository"
                        );
                        return Ok(SubmissionOutcome {
                            resource_id: resource.resource_id.clone(),
                            status: SubmissionStatus::Rejected,
                            attempts: attempt,
                            last_error: Some(rejection_detail(&response.status, response.body)),
                        });
                    }
                    Disposition::Transient => {
                        last_error = Some(format!("transient status {}", response.status));
                    }
                },
                // Authentication failures are run-fatal; retrying with the
                // same rejected credentials cannot succeed.
                Err(e @ Error::Authentication(_)) => return Err(e),
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }

            if attempt < self.policy.max_attempts {
                let delay = backoff_delay(attempt, &self.policy);
                warn!(
                    resource_id = %resource.resource_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = last_error.as_deref().unwrap_or(""),
                    "Transient submission failure, retry scheduled"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            resource_id = %resource.resource_id,
            attempts = self.policy.max_attempts,
            "Retry budget exhausted, abandoning resource"
        );
        Ok(SubmissionOutcome {
            resource_id: resource.resource_id.clone(),
            status: SubmissionStatus::Abandoned,
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

fn rejection_detail(status: &u16, body: Option<String>) -> String {
    match body {
        Some(body) if !body.is_empty() => format!("status {}: {}", status, body),
        _ => format!("status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_success_range() {
        assert_eq!(classify_status(200), Disposition::Accepted);
        assert_eq!(classify_status(201), Disposition::Accepted);
    }

    #[test]
    fn classify_transient() {
        assert_eq!(classify_status(408), Disposition::Transient);
        assert_eq!(classify_status(429), Disposition::Transient);
        assert_eq!(classify_status(500), Disposition::Transient);
        assert_eq!(classify_status(503), Disposition::Transient);
    }

    #[test]
    fn classify_permanent_rejection() {
        assert_eq!(classify_status(400), Disposition::Rejected);
        assert_eq!(classify_status(404), Disposition::Rejected);
        assert_eq!(classify_status(422), Disposition::Rejected);
    }

    #[test]
    fn backoff_ceiling_doubles_until_cap() {
        assert_eq!(backoff_ceiling_ms(1, 500, 30_000), 500);
        assert_eq!(backoff_ceiling_ms(2, 500, 30_000), 1_000);
        assert_eq!(backoff_ceiling_ms(3, 500, 30_000), 2_000);
        assert_eq!(backoff_ceiling_ms(7, 500, 30_000), 30_000);
        assert_eq!(backoff_ceiling_ms(64, 500, 30_000), 30_000);
    }

    #[test]
    fn backoff_delay_stays_within_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_ms: 100,
            max_ms: 1_000,
        };
        for attempt in 1..=10 {
            let ceiling = backoff_ceiling_ms(attempt, policy.base_ms, policy.max_ms);
            for _ in 0..50 {
                let delay = backoff_delay(attempt, &policy);
                assert!(delay.as_millis() as u64 <= ceiling);
            }
        }
    }

    #[test]
    fn default_policy_matches_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.max_attempts,
            phenolink_core::defaults::MAX_RETRY_ATTEMPTS
        );
        assert_eq!(policy.base_ms, phenolink_core::defaults::BACKOFF_BASE_MS);
    }
}
