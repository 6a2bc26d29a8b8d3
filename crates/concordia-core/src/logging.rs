//! Structured logging field names shared by all concordia crates.
//!
//! Keeping the names in one place lets log queries filter on the same field
//! across the codec, replay, history and paradigmatic subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Unrecoverable failure surfaced to the user |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Completions: chain branched, evaluation finished |
//! | DEBUG | Decision points, cache hits, intermediate counts |
//! | TRACE | Per-item iteration (ancestry ids, frequency rows) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "codec", "chain", "replay", "history", "pquery", "tasks", "client"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "encode", "decode", "reconstruct", "list", "soft_delete"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Persisted operation id.
pub const PERSISTED_ID: &str = "persisted_id";

/// History entry id.
pub const ENTRY_ID: &str = "entry_id";

/// Background task id.
pub const TASK_ID: &str = "task_id";

/// Operation kind (`query`, `sort`, ...).
pub const OPERATION_KIND: &str = "kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Number of operations in a chain.
pub const CHAIN_LEN: &str = "chain_len";

/// Number of rows or entries returned.
pub const RESULT_COUNT: &str = "result_count";

/// Number of sub-queries in a paradigmatic query.
pub const SUBQUERY_COUNT: &str = "subquery_count";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Attempt number of a retried remote call (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether a cached value was used.
pub const CACHE_HIT: &str = "cache_hit";
