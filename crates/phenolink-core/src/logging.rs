//! Structured logging schema and field name constants for phenolink.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run-fatal failures, requires operator attention |
//! | WARN  | Row/resource-scoped failure, run continues |
//! | INFO  | Lifecycle events (run start/finish, checkpoint advance) |
//! | DEBUG | Decision points, batch boundaries, config choices |
//! | TRACE | Per-row and per-term iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Run UUID correlating every event of one pipeline execution.
pub const RUN_ID: &str = "run_id";

/// Subsystem originating the log event.
/// Values: "ontology", "ingest", "resolve", "submit", "pipeline"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "build_index", "stream_rows", "resolve", "submit", "checkpoint"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Source row number being processed (1-based, header excluded).
pub const ROW: &str = "row";

/// Ontology concept identifier.
pub const CONCEPT_ID: &str = "concept_id";

/// Client-assigned resource identifier.
pub const RESOURCE_ID: &str = "resource_id";

/// Submission attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

/// Batch sequence number within the run.
pub const BATCH: &str = "batch";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of concepts loaded into the index.
pub const CONCEPT_COUNT: &str = "concept_count";

/// Number of rows processed so far.
pub const ROW_COUNT: &str = "row_count";

/// Similarity score of a fuzzy match.
pub const SCORE: &str = "score";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Terminal submission status ("accepted", "rejected", "abandoned").
pub const STATUS: &str = "status";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
