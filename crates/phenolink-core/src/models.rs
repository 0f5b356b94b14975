//! Shared data model for the phenolink pipeline.
//!
//! Records flow strictly downstream: a [`RawRecord`] is produced by
//! ingestion, annotated with [`ResolvedTerm`]s, assembled into a
//! [`CanonicalResource`], and retired once its [`SubmissionOutcome`] is
//! terminal. Every resource traces back to exactly one source row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ONTOLOGY
// =============================================================================

/// A coded entity within a classification graph.
///
/// Immutable after index construction. Parent links are identifier-based;
/// traversal goes through the owning index, never through owned pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyConcept {
    /// Stable code, e.g. `HP:0001250`.
    pub id: String,
    /// Primary human-readable label.
    pub label: String,
    /// Exact synonyms usable for matching.
    pub synonyms: Vec<String>,
    /// Identifiers of parent concepts (directed acyclic).
    pub parents: Vec<String>,
}

impl OntologyConcept {
    /// Lightweight identity + display handle for downstream carriers.
    pub fn to_ref(&self) -> ConceptRef {
        ConceptRef {
            id: self.id.clone(),
            label: self.label.clone(),
        }
    }
}

/// Identity and display label of a matched concept.
///
/// What resolved records carry instead of the full concept; the index owns
/// the synonym and parent data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRef {
    pub id: String,
    pub label: String,
}

// =============================================================================
// INGESTED RECORDS
// =============================================================================

/// One ingested row: ordered field name → raw string value pairs.
///
/// Carries its source row number (1-based, header excluded) for error
/// attribution throughout the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    row: u64,
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(row: u64, fields: Vec<(String, String)>) -> Self {
        Self { row, fields }
    }

    /// Source row number (1-based data row; the header is row 0).
    pub fn row(&self) -> u64 {
        self.row
    }

    /// Value of a named field, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Field names in source column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// TERM RESOLUTION
// =============================================================================

/// How a raw term was matched against the ontology index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Case-insensitive exact match on the primary label.
    ExactLabel,
    /// Case-insensitive exact match on a synonym.
    ExactSynonym,
    /// String-similarity match above the configured threshold.
    Fuzzy,
    /// No candidate met the threshold.
    Unresolved,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactLabel => write!(f, "exact_label"),
            Self::ExactSynonym => write!(f, "exact_synonym"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Outcome of resolving one raw term. One per resolvable field per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTerm {
    /// The raw text as ingested.
    pub raw: String,
    /// Matched concept; `None` means unresolved.
    pub concept: Option<ConceptRef>,
    /// Strategy that produced the match.
    pub strategy: MatchStrategy,
    /// Confidence in [0, 1]: 1.0 exact, similarity score for fuzzy, 0.0 unresolved.
    pub confidence: f32,
}

impl ResolvedTerm {
    pub fn is_resolved(&self) -> bool {
        self.concept.is_some()
    }

    /// An unresolved term with confidence 0.0.
    pub fn unresolved(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            concept: None,
            strategy: MatchStrategy::Unresolved,
            confidence: 0.0,
        }
    }
}

// =============================================================================
// CANONICAL RESOURCES
// =============================================================================

/// A single coding within a [`CodeableConcept`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    /// Terminology system URI, e.g. `http://purl.obolibrary.org/obo/hp.owl`.
    pub system: String,
    /// Code value within the system.
    pub code: String,
    /// Display label.
    pub display: String,
}

/// FHIR-style codeable concept: coded when resolution succeeded, free-text
/// fallback otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn coded(system: impl Into<String>, code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            coding: vec![Coding {
                system: system.into(),
                code: code.into(),
                display: display.into(),
            }],
            text: None,
        }
    }

    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            coding: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn is_coded(&self) -> bool {
        !self.coding.is_empty()
    }
}

/// The assembled clinical-record structure. Immutable once built; owned by
/// the submission client until acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResource {
    /// Client-assigned stable identifier; the remote repository treats
    /// re-submission of the same id as an upsert.
    pub resource_id: String,
    /// FHIR resource type, e.g. `Condition`.
    pub resource_type: String,
    /// Subject (patient) identifier from the source record.
    pub subject: String,
    /// Coded fields keyed by source field name, in stable order.
    pub codes: BTreeMap<String, CodeableConcept>,
    /// Source row number for error attribution.
    pub source_row: u64,
}

// =============================================================================
// SUBMISSION
// =============================================================================

/// Final (or pending) status of a submitted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Remote repository acknowledged with a success status.
    Accepted,
    /// Permanent validation failure; never retried.
    Rejected,
    /// Transient failure; a retry is scheduled.
    PendingRetry,
    /// Retry budget exhausted.
    Abandoned,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingRetry)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::PendingRetry => write!(f, "pending_retry"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Result of submitting one resource, persisted until run completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub resource_id: String,
    pub status: SubmissionStatus,
    /// Attempts made; never exceeds the configured retry ceiling.
    pub attempts: u32,
    pub last_error: Option<String>,
}

// =============================================================================
// CHECKPOINTING & SUMMARY
// =============================================================================

/// Per-run tallies accumulated across batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Resources acknowledged by the remote repository.
    pub accepted: u64,
    /// Resources permanently rejected by the remote repository.
    pub rejected: u64,
    /// Resources whose retry budget was exhausted.
    pub abandoned: u64,
    /// Resources dropped before submission (mandatory field unresolved).
    pub dropped: u64,
    /// Rows skipped at ingestion (failed row validation).
    pub skipped_rows: u64,
}

impl RunCounts {
    /// Fold another tally into this one.
    pub fn merge(&mut self, other: &RunCounts) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.abandoned += other.abandoned;
        self.dropped += other.dropped;
        self.skipped_rows += other.skipped_rows;
    }

    pub fn total(&self) -> u64 {
        self.accepted + self.rejected + self.abandoned + self.dropped + self.skipped_rows
    }
}

/// Persisted marker of processing progress enabling resumable runs.
///
/// `row_offset` is monotonically non-decreasing within a run; a resumed run
/// never reprocesses rows at or before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    /// Last fully-processed source row number.
    pub row_offset: u64,
    /// Cumulative counts at the time of the checkpoint.
    pub counts: RunCounts,
    pub updated_at: DateTime<Utc>,
}

impl PipelineCheckpoint {
    pub fn new(row_offset: u64, counts: RunCounts) -> Self {
        Self {
            row_offset,
            counts,
            updated_at: Utc::now(),
        }
    }
}

/// End-of-run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub counts: RunCounts,
    /// Row offset the run resumed from (0 for a fresh run).
    pub resumed_from: u64,
    /// Highest fully-processed row number.
    pub final_offset: u64,
    pub duration_ms: u64,
}
