//! Interfaces of the remote collaborators.
//!
//! Every call here crosses the network in production. The client crate
//! provides HTTP implementations; the `mock` module provides in-memory
//! ones for tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// PERSISTED-OPERATION STORE
// =============================================================================

/// Server-side store of query operations referenced by opaque ids.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist an operation and return its new id.
    async fn encode(
        &self,
        kind: OperationKind,
        form_args: &FormArgs,
        predecessor: Option<&PersistedId>,
    ) -> Result<PersistedId>;

    /// Load the stored descriptor of an operation.
    ///
    /// Unknown or expired ids yield `Error::NotFound`.
    async fn decode(&self, id: &PersistedId) -> Result<PersistedOperation>;

    /// Ordered ids from the chain root to `id` (inclusive).
    async fn list_ancestry(&self, id: &PersistedId) -> Result<Vec<PersistedId>>;
}

// =============================================================================
// HISTORY API
// =============================================================================

/// Remote query-history log.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// List entries matching the filter, newest first.
    async fn list(&self, filter: &HistoryFilter) -> Result<HistoryPage>;

    /// Record a new entry and return it.
    async fn record(&self, entry: NewHistoryEntry) -> Result<HistoryEntry>;

    /// Point an existing entry at a newer tail of the same chain.
    async fn update_tail(&self, entry_id: &str, tail: NewHistoryEntry) -> Result<HistoryEntry>;

    /// Set the archived flag. Idempotent.
    async fn set_archived(&self, entry_id: &str, archived: bool) -> Result<()>;

    /// Mark an entry as deleted (tombstone).
    async fn soft_delete(&self, entry_id: &str) -> Result<()>;

    /// Clear the deleted flag of an entry.
    async fn restore(&self, entry_id: &str) -> Result<()>;

    /// Set or clear (`None`) the user label.
    async fn rename(&self, entry_id: &str, label: Option<&str>) -> Result<()>;
}

// =============================================================================
// FREQUENCY SERVICE
// =============================================================================

/// Remote CQL execution returning attribute frequency lists.
#[async_trait]
pub trait FrequencyService: Send + Sync {
    /// Compute the frequency list of `req.attr` over the hits of `req.cql`.
    ///
    /// Large requests may be answered with a background task handle.
    async fn freq_list(&self, req: &FreqRequest) -> Result<FreqOutcome>;

    /// Fetch the frequency list produced by a finished background task.
    async fn fetch_result(&self, result_ref: &str) -> Result<Vec<FreqItem>>;
}

// =============================================================================
// TASK STATUS FEED
// =============================================================================

/// Feed listing the caller's background tasks.
#[async_trait]
pub trait TaskStatusFeed: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<TaskInfo>>;
}
