//! In-memory collaborators for deterministic testing.
//!
//! Each mock keeps its state behind an `Arc<Mutex<_>>`, so clones share
//! state and tests can inspect call logs after handing a clone to the
//! component under test.
//!
//! ## Usage
//!
//! ```ignore
//! use concordia_core::mock::InMemoryOperationStore;
//! use concordia_core::{FormArgs, OperationKind, OperationStore};
//!
//! let store = InMemoryOperationStore::new();
//! let id = store.encode(OperationKind::Query, &FormArgs::new(), None).await?;
//! assert_eq!(store.decode(&id).await?.kind, OperationKind::Query);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::*;

/// One recorded call to a mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

fn log_call(log: &mut Vec<MockCall>, operation: &str, input: impl Into<String>) {
    log.push(MockCall {
        operation: operation.to_string(),
        input: input.into(),
    });
}

// =============================================================================
// OPERATION STORE
// =============================================================================

#[derive(Default)]
struct StoreState {
    ops: HashMap<PersistedId, PersistedOperation>,
    next_id: u64,
    ancestry_overrides: HashMap<PersistedId, Vec<PersistedId>>,
    unavailable_failures: u32,
    calls: Vec<MockCall>,
}

/// In-memory persisted-operation store.
#[derive(Clone, Default)]
pub struct InMemoryOperationStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls (of any kind) with `Error::Unavailable`.
    pub fn with_unavailable_failures(self, n: u32) -> Self {
        self.fail_next_unavailable(n);
        self
    }

    pub fn fail_next_unavailable(&self, n: u32) {
        self.state.lock().unwrap().unavailable_failures = n;
    }

    /// Insert a descriptor verbatim, bypassing predecessor checks.
    pub fn insert_raw(&self, op: PersistedOperation) {
        self.state.lock().unwrap().ops.insert(op.id.clone(), op);
    }

    /// Make `list_ancestry(id)` return `ancestry` instead of walking links.
    pub fn set_ancestry(&self, id: &PersistedId, ancestry: Vec<PersistedId>) {
        self.state
            .lock()
            .unwrap()
            .ancestry_overrides
            .insert(id.clone(), ancestry);
    }

    /// Forget an operation, as if it expired server-side.
    pub fn expire(&self, id: &PersistedId) {
        self.state.lock().unwrap().ops.remove(id);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn take_failure(state: &mut StoreState) -> Result<()> {
        if state.unavailable_failures > 0 {
            state.unavailable_failures -= 1;
            return Err(Error::Unavailable("mock store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn encode(
        &self,
        kind: OperationKind,
        form_args: &FormArgs,
        predecessor: Option<&PersistedId>,
    ) -> Result<PersistedId> {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "encode", kind.as_str());
        Self::take_failure(&mut state)?;
        if let Some(pred) = predecessor {
            if !state.ops.contains_key(pred) {
                return Err(Error::NotFound(format!("predecessor {}", pred)));
            }
        }
        state.next_id += 1;
        let id = PersistedId::new(format!("op{:04}", state.next_id))?;
        let op = PersistedOperation {
            id: id.clone(),
            kind,
            form_args: form_args.clone(),
            predecessor_id: predecessor.cloned(),
            result_size: None,
            created_at: Some(Utc::now()),
        };
        state.ops.insert(id.clone(), op);
        Ok(id)
    }

    async fn decode(&self, id: &PersistedId) -> Result<PersistedOperation> {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "decode", id.as_str());
        Self::take_failure(&mut state)?;
        state
            .ops
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("operation {}", id)))
    }

    async fn list_ancestry(&self, id: &PersistedId) -> Result<Vec<PersistedId>> {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "list_ancestry", id.as_str());
        Self::take_failure(&mut state)?;
        if let Some(ancestry) = state.ancestry_overrides.get(id) {
            return Ok(ancestry.clone());
        }
        if !state.ops.contains_key(id) {
            return Err(Error::NotFound(format!("operation {}", id)));
        }
        let mut chain = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            // stop on cycles; the consumer detects them
            if chain.len() > state.ops.len() {
                break;
            }
            cursor = state
                .ops
                .get(&current)
                .and_then(|op| op.predecessor_id.clone());
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }
}

// =============================================================================
// HISTORY API
// =============================================================================

#[derive(Default)]
struct HistoryState {
    /// Oldest first.
    entries: Vec<HistoryEntry>,
    next_id: u64,
    unavailable_failures: u32,
    calls: Vec<MockCall>,
}

/// In-memory history log.
#[derive(Clone, Default)]
pub struct InMemoryHistoryApi {
    state: Arc<Mutex<HistoryState>>,
}

impl InMemoryHistoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry; later insertions are newer.
    pub fn insert_entry(&self, entry: HistoryEntry) {
        self.state.lock().unwrap().entries.push(entry);
    }

    pub fn fail_next_unavailable(&self, n: u32) {
        self.state.lock().unwrap().unavailable_failures = n;
    }

    /// Server-side view of an entry, including tombstoned ones.
    pub fn entry(&self, entry_id: &str) -> Option<HistoryEntry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn update<F>(&self, operation: &str, entry_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut HistoryEntry),
    {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, operation, entry_id);
        if state.unavailable_failures > 0 {
            state.unavailable_failures -= 1;
            return Err(Error::Unavailable("mock history unavailable".to_string()));
        }
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| Error::NotFound(format!("history entry {}", entry_id)))?;
        f(entry);
        Ok(())
    }
}

#[async_trait]
impl HistoryApi for InMemoryHistoryApi {
    async fn list(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        filter.validate()?;
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "list", format!("page={}", filter.page));
        if state.unavailable_failures > 0 {
            state.unavailable_failures -= 1;
            return Err(Error::Unavailable("mock history unavailable".to_string()));
        }
        let matching: Vec<&HistoryEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .collect();
        let total = matching.len();
        let start = (filter.page - 1) * filter.page_size;
        let entries: Vec<HistoryEntry> = matching
            .into_iter()
            .skip(start)
            .take(filter.page_size)
            .cloned()
            .collect();
        Ok(HistoryPage {
            has_more: start + entries.len() < total,
            entries,
            total,
            page: filter.page,
            page_size: filter.page_size,
        })
    }

    async fn record(&self, new_entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "record", new_entry.query_id.as_str());
        state.next_id += 1;
        let entry = HistoryEntry {
            id: format!("h{}", state.next_id),
            query_id: new_entry.query_id,
            root_kind: new_entry.root_kind,
            kind: new_entry.kind,
            form_args: new_entry.form_args,
            label: None,
            archived: false,
            deleted: false,
            created_at: Utc::now(),
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn update_tail(&self, entry_id: &str, tail: NewHistoryEntry) -> Result<HistoryEntry> {
        let mut updated = None;
        self.update("update_tail", entry_id, |e| {
            e.query_id = tail.query_id;
            e.kind = tail.kind;
            e.form_args = tail.form_args;
            updated = Some(e.clone());
        })?;
        updated.ok_or_else(|| Error::NotFound(format!("history entry {}", entry_id)))
    }

    async fn set_archived(&self, entry_id: &str, archived: bool) -> Result<()> {
        self.update("set_archived", entry_id, |e| e.archived = archived)
    }

    async fn soft_delete(&self, entry_id: &str) -> Result<()> {
        self.update("soft_delete", entry_id, |e| e.deleted = true)
    }

    async fn restore(&self, entry_id: &str) -> Result<()> {
        self.update("restore", entry_id, |e| e.deleted = false)
    }

    async fn rename(&self, entry_id: &str, label: Option<&str>) -> Result<()> {
        let label = label.map(str::to_string);
        self.update("rename", entry_id, |e| e.label = label)
    }
}

// =============================================================================
// FREQUENCY SERVICE
// =============================================================================

#[derive(Default)]
struct FreqState {
    lists: HashMap<String, Vec<FreqItem>>,
    background: HashMap<String, String>,
    unavailable_cql: HashSet<String>,
    calls: Vec<MockCall>,
}

/// Frequency service answering from fixed per-CQL lists.
///
/// CQL without a configured list yields an empty frequency list.
#[derive(Clone, Default)]
pub struct MockFrequencyService {
    state: Arc<Mutex<FreqState>>,
}

impl MockFrequencyService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(self, cql: impl Into<String>, items: Vec<FreqItem>) -> Self {
        self.state.lock().unwrap().lists.insert(cql.into(), items);
        self
    }

    /// Answer `cql` with a pending task `task_id`; the list is served by
    /// `fetch_result(task_id)`.
    pub fn with_background(self, cql: impl Into<String>, task_id: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .background
            .insert(cql.into(), task_id.into());
        self
    }

    pub fn with_unavailable(self, cql: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .unavailable_cql
            .insert(cql.into());
        self
    }

    pub fn freq_call_count(&self, cql: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == "freq_list" && c.input == cql)
            .count()
    }

    pub fn total_calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }
}

#[async_trait]
impl FrequencyService for MockFrequencyService {
    async fn freq_list(&self, req: &FreqRequest) -> Result<FreqOutcome> {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "freq_list", req.cql.clone());
        if state.unavailable_cql.contains(&req.cql) {
            return Err(Error::Unavailable(format!("cannot compute {}", req.cql)));
        }
        if let Some(task_id) = state.background.get(&req.cql) {
            return Ok(FreqOutcome::Pending {
                task: TaskHandle {
                    task_id: task_id.clone(),
                },
            });
        }
        Ok(FreqOutcome::Ready {
            items: state.lists.get(&req.cql).cloned().unwrap_or_default(),
        })
    }

    async fn fetch_result(&self, result_ref: &str) -> Result<Vec<FreqItem>> {
        let mut state = self.state.lock().unwrap();
        log_call(&mut state.calls, "fetch_result", result_ref);
        let cql = state
            .background
            .iter()
            .find(|(_, task)| task.as_str() == result_ref)
            .map(|(cql, _)| cql.clone())
            .ok_or_else(|| Error::NotFound(format!("task result {}", result_ref)))?;
        Ok(state.lists.get(&cql).cloned().unwrap_or_default())
    }
}

// =============================================================================
// TASK STATUS FEED
// =============================================================================

#[derive(Default)]
struct FeedState {
    scripts: HashMap<String, VecDeque<TaskStatus>>,
    polls: usize,
}

/// Task feed replaying a scripted status sequence per task.
///
/// Each `list_tasks` call advances every script by one step; the last
/// status repeats once the script is exhausted. Tasks without a script are
/// absent from the feed.
#[derive(Clone, Default)]
pub struct MockTaskFeed {
    state: Arc<Mutex<FeedState>>,
}

impl MockTaskFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, task_id: impl Into<String>, statuses: Vec<TaskStatus>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(task_id.into(), statuses.into_iter().collect());
        self
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().unwrap().polls
    }
}

#[async_trait]
impl TaskStatusFeed for MockTaskFeed {
    async fn list_tasks(&self) -> Result<Vec<TaskInfo>> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        let mut tasks = Vec::new();
        for (task_id, script) in state.scripts.iter_mut() {
            let status = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            };
            if let Some(status) = status {
                tasks.push(TaskInfo {
                    task_id: task_id.clone(),
                    status,
                    result_ref: (status == TaskStatus::Finished).then(|| task_id.clone()),
                    error: (status == TaskStatus::Failed).then(|| "task failed".to_string()),
                });
            }
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_walks_predecessors() {
        let store = InMemoryOperationStore::new();
        let root = store
            .encode(OperationKind::Query, &FormArgs::new(), None)
            .await
            .unwrap();
        let sort = store
            .encode(OperationKind::Sort, &FormArgs::new(), Some(&root))
            .await
            .unwrap();
        let ancestry = store.list_ancestry(&sort).await.unwrap();
        assert_eq!(ancestry, vec![root, sort]);
    }

    #[tokio::test]
    async fn test_store_unknown_predecessor() {
        let store = InMemoryOperationStore::new();
        let ghost = PersistedId::new("ghost").unwrap();
        let err = store
            .encode(OperationKind::Sort, &FormArgs::new(), Some(&ghost))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_failure_injection_counts_down() {
        let store = InMemoryOperationStore::new().with_unavailable_failures(1);
        let first = store.encode(OperationKind::Query, &FormArgs::new(), None).await;
        assert!(matches!(first, Err(Error::Unavailable(_))));
        let second = store.encode(OperationKind::Query, &FormArgs::new(), None).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_history_list_newest_first() {
        let api = InMemoryHistoryApi::new();
        for i in 0..3 {
            api.record(NewHistoryEntry {
                query_id: PersistedId::new(format!("q{}", i)).unwrap(),
                root_kind: OperationKind::Query,
                kind: OperationKind::Query,
                form_args: FormArgs::new(),
            })
            .await
            .unwrap();
        }
        let page = api.list(&HistoryFilter::default()).await.unwrap();
        let ids: Vec<_> = page.entries.iter().map(|e| e.query_id.as_str()).collect();
        assert_eq!(ids, vec!["q2", "q1", "q0"]);
        assert_eq!(page.total, 3);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_feed_script_repeats_last_status() {
        let feed = MockTaskFeed::new()
            .with_script("t1", vec![TaskStatus::Running, TaskStatus::Finished]);
        let first = feed.list_tasks().await.unwrap();
        assert_eq!(first[0].status, TaskStatus::Running);
        let second = feed.list_tasks().await.unwrap();
        assert_eq!(second[0].status, TaskStatus::Finished);
        assert_eq!(second[0].result_ref.as_deref(), Some("t1"));
        let third = feed.list_tasks().await.unwrap();
        assert_eq!(third[0].status, TaskStatus::Finished);
        assert_eq!(feed.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_frequency_background_result() {
        let service = MockFrequencyService::new()
            .with_list("[tag=\"N.*\"]", vec![FreqItem::new("dog", 4)])
            .with_background("[tag=\"N.*\"]", "t7");
        let req = FreqRequest {
            corpus: "c".to_string(),
            attr: "word".to_string(),
            cql: "[tag=\"N.*\"]".to_string(),
        };
        let outcome = service.freq_list(&req).await.unwrap();
        assert!(matches!(outcome, FreqOutcome::Pending { .. }));
        let items = service.fetch_result("t7").await.unwrap();
        assert_eq!(items, vec![FreqItem::new("dog", 4)]);
    }
}
