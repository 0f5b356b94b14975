//! # phenolink-submit
//!
//! Authenticated, retrying submission of canonical resources to a remote
//! FHIR-style repository.
//!
//! This crate provides:
//! - OAuth2 client-credentials token acquisition with a cached,
//!   proactively-refreshed bearer token
//! - A submission state machine with exponential backoff, jitter, and an
//!   attempt ceiling
//! - PUT-by-logical-id upserts, so retried submissions never duplicate
//! - An in-memory mock repository for deterministic tests

pub mod client;
pub mod fhir;
pub mod mock;
pub mod token;

pub use client::{
    backoff_ceiling_ms, backoff_delay, classify_status, Disposition, RetryPolicy, SubmissionClient,
};
pub use fhir::{FhirConfig, FhirRepository};
pub use mock::{MockRepository, StaticTokenProvider};
pub use token::{OAuthConfig, OAuthTokenProvider};
