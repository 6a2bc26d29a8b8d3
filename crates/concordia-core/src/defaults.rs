//! Centralized default constants for concordia.
//!
//! Crates reference these instead of defining their own magic numbers.
//! Configuration structs use them as their `Default` values and
//! environment-variable fallbacks.

// =============================================================================
// HISTORY
// =============================================================================

/// Default number of history entries per page.
pub const HISTORY_PAGE_SIZE: usize = 10;

/// Largest page size accepted by the history list call.
pub const HISTORY_MAX_PAGE_SIZE: usize = 500;

// =============================================================================
// PERSISTENCE CODEC
// =============================================================================

/// Number of decoded operations kept per page view.
pub const CODEC_CACHE_CAPACITY: usize = 256;

/// Seconds a decoded operation stays in the cache.
pub const CODEC_CACHE_TTL_SECS: u64 = 300;

/// Automatic retries of a remote call that failed with `Unavailable`.
pub const CODEC_UNAVAILABLE_RETRIES: u32 = 1;

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

/// Interval between two reads of the task status feed (milliseconds).
pub const TASK_POLL_INTERVAL_MS: u64 = 1000;

/// Consecutive polls a task may be absent from the feed before it is
/// reported as not found.
pub const TASK_MISSING_GRACE_POLLS: u32 = 5;

/// Capacity of the task event broadcast channel.
pub const TASK_EVENT_CAPACITY: usize = 64;

// =============================================================================
// PARADIGMATIC QUERY
// =============================================================================

/// Default paradigmatic result page size.
pub const PQUERY_PAGE_SIZE: usize = 10;

/// Default minimum frequency of a sub-query item.
pub const PQUERY_MIN_FREQ: u64 = 1;

/// Raw frequency lists kept by one paradigmatic evaluator.
pub const PQUERY_LIST_CACHE_CAPACITY: usize = 64;

/// Default attribute combined by a paradigmatic query.
pub const PQUERY_ATTR: &str = "word";

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// Default server base URL.
pub const BASE_URL: &str = "http://localhost:8080";

/// Request timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;
