//! Retry state machine tests against the in-memory mock repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use phenolink_core::{
    CanonicalResource, Error, ResourceRepository, Result, SubmissionStatus, UpsertResponse,
};
use phenolink_submit::{MockRepository, RetryPolicy, SubmissionClient};

fn resource(id: &str) -> CanonicalResource {
    CanonicalResource {
        resource_id: id.to_string(),
        resource_type: "Condition".to_string(),
        subject: "P001".to_string(),
        codes: BTreeMap::new(),
        source_row: 1,
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_ms: 1,
        max_ms: 5,
    }
}

#[tokio::test]
async fn first_attempt_success_is_accepted() {
    let repo = MockRepository::new().with_default_status(201);
    let client = SubmissionClient::new(Arc::new(repo.clone()), fast_policy(5));

    let outcome = client.submit(&resource("r1")).await.unwrap();

    assert_eq!(outcome.status, SubmissionStatus::Accepted);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.last_error.is_none());
    assert_eq!(repo.stored_count(), 1);
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let repo = MockRepository::new().with_script("r1", [503, 429, 200]);
    let client = SubmissionClient::new(Arc::new(repo.clone()), fast_policy(5));

    let outcome = client.submit(&resource("r1")).await.unwrap();

    assert_eq!(outcome.status, SubmissionStatus::Accepted);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(repo.upsert_count("r1"), 3);
}

#[tokio::test]
async fn exhausted_retries_abandon_with_attempt_ceiling() {
    let repo = MockRepository::new().with_default_status(503);
    let client = SubmissionClient::new(Arc::new(repo.clone()), fast_policy(3));

    let outcome = client.submit(&resource("r1")).await.unwrap();

    assert_eq!(outcome.status, SubmissionStatus::Abandoned);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.last_error.unwrap().contains("503"));
    // Attempts never exceed the ceiling.
    assert_eq!(repo.upsert_count("r1"), 3);
    assert_eq!(repo.stored_count(), 0);
}

#[tokio::test]
async fn transport_errors_count_as_transient() {
    let repo = MockRepository::new().with_unreachable(true);
    let client = SubmissionClient::new(Arc::new(repo.clone()), fast_policy(2));

    let outcome = client.submit(&resource("r1")).await.unwrap();

    assert_eq!(outcome.status, SubmissionStatus::Abandoned);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.last_error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn permanent_rejection_is_never_retried() {
    let repo = MockRepository::new().with_default_status(422);
    let client = SubmissionClient::new(Arc::new(repo.clone()), fast_policy(5));

    let outcome = client.submit(&resource("r1")).await.unwrap();

    assert_eq!(outcome.status, SubmissionStatus::Rejected);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(repo.upsert_count("r1"), 1);
}

#[tokio::test]
async fn resubmission_after_accept_does_not_duplicate() {
    let repo = MockRepository::new();
    let client = SubmissionClient::new(Arc::new(repo.clone()), fast_policy(5));
    let r = resource("r1");

    let first = client.submit(&r).await.unwrap();
    let second = client.submit(&r).await.unwrap();

    assert_eq!(first.status, SubmissionStatus::Accepted);
    assert_eq!(second.status, SubmissionStatus::Accepted);
    // Same client-assigned id: the remote treats it as an upsert.
    assert_eq!(repo.stored_count(), 1);
    assert_eq!(repo.upsert_count("r1"), 2);
}

struct RevokedCredentials;

#[async_trait]
impl ResourceRepository for RevokedCredentials {
    async fn upsert(&self, _resource: &CanonicalResource) -> Result<UpsertResponse> {
        Err(Error::Authentication("client credentials revoked".to_string()))
    }
}

#[tokio::test]
async fn authentication_failure_is_fatal_not_retried() {
    let client = SubmissionClient::new(Arc::new(RevokedCredentials), fast_policy(5));

    match client.submit(&resource("r1")).await {
        Err(Error::Authentication(msg)) => assert!(msg.contains("revoked")),
        other => panic!("expected fatal Authentication error, got {:?}", other),
    }
}
