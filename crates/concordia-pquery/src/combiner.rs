//! Paradigmatic query evaluator.
//!
//! Fetches one frequency list per distinct sub-query, waiting on background
//! tasks where the service defers the computation, then combines them. Raw
//! lists are cached per `(corpus, attr, cql)`, so changing thresholds or
//! negation re-combines without re-fetching.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use lru::LruCache;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use concordia_core::{
    defaults, Error, FreqItem, FreqOutcome, FreqRequest, FrequencyService, PQuerySpec, Result,
    TaskHandle,
};
use concordia_tasks::TaskWatcher;

use crate::combine::combine;
use crate::result::PQueryResult;

type FreqList = Arc<Vec<FreqItem>>;

/// Evaluation state published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CombinerStatus {
    #[default]
    Idle,
    /// Waiting on `pending` frequency lists.
    Unfinished { pending: usize },
    Finished { rows: usize },
    Failed { message: String },
}

impl CombinerStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, CombinerStatus::Finished { .. })
    }
}

/// Evaluates paradigmatic queries against a [`FrequencyService`].
pub struct ParadigmaticCombiner {
    freq: Arc<dyn FrequencyService>,
    watcher: TaskWatcher,
    raw_lists: Mutex<LruCache<FreqRequest, FreqList>>,
    status_tx: watch::Sender<CombinerStatus>,
}

impl ParadigmaticCombiner {
    pub fn new(freq: Arc<dyn FrequencyService>, watcher: TaskWatcher) -> Self {
        Self::with_cache_capacity(freq, watcher, defaults::PQUERY_LIST_CACHE_CAPACITY)
    }

    /// Keep at most `capacity` raw lists, least recently used evicted first.
    pub fn with_cache_capacity(
        freq: Arc<dyn FrequencyService>,
        watcher: TaskWatcher,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let (status_tx, _) = watch::channel(CombinerStatus::Idle);
        Self {
            freq,
            watcher,
            raw_lists: Mutex::new(LruCache::new(capacity)),
            status_tx,
        }
    }

    /// Subscribe to status changes.
    pub fn status(&self) -> watch::Receiver<CombinerStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> CombinerStatus {
        self.status_tx.borrow().clone()
    }

    /// Number of cached raw frequency lists.
    pub async fn cached_lists(&self) -> usize {
        self.raw_lists.lock().await.len()
    }

    pub async fn clear_cache(&self) {
        self.raw_lists.lock().await.clear();
    }

    /// Evaluate `spec` into a sorted result.
    ///
    /// The definition is validated before any remote call. A failed
    /// background task is terminal for this evaluation.
    #[instrument(skip(self, spec), fields(subquery_count = spec.subqueries.len()))]
    pub async fn evaluate(&self, spec: &PQuerySpec) -> Result<PQueryResult> {
        spec.validate()?;
        let start = Instant::now();

        match self.run(spec).await {
            Ok(result) => {
                self.status_tx.send_replace(CombinerStatus::Finished { rows: result.len() });
                info!(
                    result_count = result.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Paradigmatic query evaluated"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Paradigmatic query failed");
                self.status_tx.send_replace(CombinerStatus::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, spec: &PQuerySpec) -> Result<PQueryResult> {
        let requests: Vec<FreqRequest> = spec
            .subqueries
            .iter()
            .map(|s| FreqRequest {
                corpus: spec.corpus.clone(),
                attr: spec.attr.clone(),
                cql: s.cql.clone(),
            })
            .collect();

        let mut resolved: HashMap<FreqRequest, FreqList> = HashMap::new();
        let mut missing: Vec<FreqRequest> = Vec::new();
        {
            let mut cache = self.raw_lists.lock().await;
            for req in &requests {
                if resolved.contains_key(req) || missing.contains(req) {
                    continue;
                }
                match cache.get(req) {
                    Some(list) => {
                        resolved.insert(req.clone(), list.clone());
                    }
                    None => missing.push(req.clone()),
                }
            }
        }
        debug!(
            fetch = missing.len(),
            cached = resolved.len(),
            "Resolving frequency lists"
        );

        if !missing.is_empty() {
            self.status_tx.send_replace(CombinerStatus::Unfinished {
                pending: missing.len(),
            });
            resolved.extend(self.fetch(missing).await?);
        }

        let lists: Vec<FreqList> = requests
            .iter()
            .map(|req| {
                resolved.get(req).cloned().ok_or_else(|| {
                    Error::NotFound(format!("no frequency list for {}", req.cql))
                })
            })
            .collect::<Result<_>>()?;
        let slices: Vec<&[FreqItem]> = lists.iter().map(|l| l.as_slice()).collect();
        let rows = combine(&spec.subqueries, &slices)?;
        Ok(PQueryResult::new(spec.subqueries.clone(), rows))
    }

    /// Fetch `requests` concurrently, caching each list as it arrives.
    ///
    /// Requests answered with the same background task share one wait and
    /// one result download.
    async fn fetch(&self, requests: Vec<FreqRequest>) -> Result<Vec<(FreqRequest, FreqList)>> {
        let outcomes = try_join_all(requests.iter().map(|req| self.freq.freq_list(req))).await?;

        let mut fetched: Vec<(FreqRequest, FreqList)> = Vec::with_capacity(requests.len());
        let mut deferred: Vec<(FreqRequest, TaskHandle)> = Vec::new();
        for (req, outcome) in requests.into_iter().zip(outcomes) {
            match outcome {
                FreqOutcome::Ready { items } => fetched.push((req, Arc::new(items))),
                FreqOutcome::Pending { task } => deferred.push((req, task)),
            }
        }
        self.remember(&fetched).await;
        if deferred.is_empty() {
            return Ok(fetched);
        }

        let mut handles: Vec<TaskHandle> = Vec::new();
        for (_, handle) in &deferred {
            if !handles.contains(handle) {
                handles.push(handle.clone());
            }
        }
        self.status_tx.send_replace(CombinerStatus::Unfinished {
            pending: deferred.len(),
        });
        debug!(
            task_count = handles.len(),
            request_count = deferred.len(),
            "Waiting on background frequency tasks"
        );
        let infos = self.watcher.wait_for_all(&handles).await?;

        let results = try_join_all(infos.iter().map(|info| {
            let result_ref = info.result_ref.as_deref().unwrap_or(&info.task_id);
            self.freq.fetch_result(result_ref)
        }))
        .await?;
        let by_task: HashMap<String, FreqList> = infos
            .iter()
            .map(|info| info.task_id.clone())
            .zip(results.into_iter().map(Arc::new))
            .collect();

        let mut downloaded: Vec<(FreqRequest, FreqList)> = Vec::with_capacity(deferred.len());
        for (req, handle) in deferred {
            let list = by_task.get(&handle.task_id).cloned().ok_or_else(|| {
                Error::NotFound(format!("result of task {}", handle.task_id))
            })?;
            downloaded.push((req, list));
        }
        self.remember(&downloaded).await;
        fetched.extend(downloaded);
        Ok(fetched)
    }

    async fn remember(&self, lists: &[(FreqRequest, FreqList)]) {
        let mut cache = self.raw_lists.lock().await;
        for (req, list) in lists {
            cache.put(req.clone(), list.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_core::mock::{MockFrequencyService, MockTaskFeed};
    use concordia_core::{Error, SubQueryItem, TaskStatus};
    use concordia_tasks::WatcherConfig;

    fn items(pairs: &[(&str, u64)]) -> Vec<FreqItem> {
        pairs.iter().map(|(v, f)| FreqItem::new(*v, *f)).collect()
    }

    fn combiner(freq: &MockFrequencyService, feed: MockTaskFeed) -> ParadigmaticCombiner {
        let watcher = TaskWatcher::new(
            Arc::new(feed),
            WatcherConfig::default().with_poll_interval(50),
        );
        ParadigmaticCombiner::new(Arc::new(freq.clone()), watcher)
    }

    fn spec() -> PQuerySpec {
        PQuerySpec::new("susanne", "word")
            .with_subquery(SubQueryItem::required("A", 1))
            .with_subquery(SubQueryItem::required("B", 1))
    }

    #[tokio::test]
    async fn test_validation_precedes_fetch() {
        let freq = MockFrequencyService::new();
        let c = combiner(&freq, MockTaskFeed::new());
        let only_negated =
            PQuerySpec::new("susanne", "word").with_subquery(SubQueryItem::excluded("A"));

        let err = c.evaluate(&only_negated).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCombination(_)));
        assert_eq!(freq.total_calls("freq_list"), 0);
        assert_eq!(c.current_status(), CombinerStatus::Idle);
    }

    #[tokio::test]
    async fn test_evaluate_ready_lists() {
        let freq = MockFrequencyService::new()
            .with_list("A", items(&[("x", 3), ("y", 1)]))
            .with_list("B", items(&[("x", 2), ("z", 4)]));
        let c = combiner(&freq, MockTaskFeed::new());

        let result = c.evaluate(&spec()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0].value, "x");
        assert_eq!(result.rows()[0].total_freq, 5);
        assert_eq!(c.current_status(), CombinerStatus::Finished { rows: 1 });
    }

    #[tokio::test]
    async fn test_reevaluate_uses_cached_lists() {
        let freq = MockFrequencyService::new()
            .with_list("A", items(&[("x", 3), ("y", 1)]))
            .with_list("B", items(&[("x", 2), ("y", 4)]));
        let c = combiner(&freq, MockTaskFeed::new());
        assert_eq!(c.evaluate(&spec()).await.unwrap().len(), 2);

        let mut stricter = spec();
        stricter.subqueries[0].min_freq = 2;
        assert_eq!(c.evaluate(&stricter).await.unwrap().len(), 1);
        assert_eq!(freq.freq_call_count("A"), 1);
        assert_eq!(freq.freq_call_count("B"), 1);
        assert_eq!(c.cached_lists().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_cql_fetched_once() {
        let freq = MockFrequencyService::new().with_list("A", items(&[("x", 3)]));
        let c = combiner(&freq, MockTaskFeed::new());
        let s = PQuerySpec::new("susanne", "word")
            .with_subquery(SubQueryItem::required("A", 1))
            .with_subquery(SubQueryItem::excluded("A"));

        assert!(c.evaluate(&s).await.unwrap().is_empty());
        assert_eq!(freq.freq_call_count("A"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_is_awaited() {
        let freq = MockFrequencyService::new()
            .with_list("A", items(&[("x", 3), ("y", 1)]))
            .with_background("A", "task-a")
            .with_list("B", items(&[("x", 2), ("y", 4)]));
        let feed = MockTaskFeed::new().with_script(
            "task-a",
            vec![TaskStatus::Running, TaskStatus::Running, TaskStatus::Finished],
        );
        let c = combiner(&freq, feed.clone());
        let mut status = c.status();

        let result = c.evaluate(&spec()).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(feed.poll_count(), 3);
        assert_eq!(freq.total_calls("fetch_result"), 1);
        assert!(status.has_changed().unwrap());
        assert!(status.borrow_and_update().is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_is_terminal() {
        let freq = MockFrequencyService::new()
            .with_background("A", "task-a")
            .with_list("B", items(&[("x", 2)]));
        let feed = MockTaskFeed::new().with_script("task-a", vec![TaskStatus::Failed]);
        let c = combiner(&freq, feed);

        let err = c.evaluate(&spec()).await.unwrap_err();
        assert!(matches!(err, Error::TaskFailed { .. }));
        assert!(matches!(c.current_status(), CombinerStatus::Failed { .. }));
        // the ready list is kept, the failed one is not
        assert_eq!(c.cached_lists().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_task_feeds_every_subquery() {
        let freq = MockFrequencyService::new()
            .with_list("A", items(&[("x", 5)]))
            .with_list("B", items(&[("x", 5)]))
            .with_background("A", "batch")
            .with_background("B", "batch");
        let feed = MockTaskFeed::new()
            .with_script("batch", vec![TaskStatus::Running, TaskStatus::Finished]);
        let c = combiner(&freq, feed);

        let result = c.evaluate(&spec()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0].per_subquery_freq, vec![5, 5]);
        assert_eq!(result.rows()[0].total_freq, 10);
        assert_eq!(freq.total_calls("fetch_result"), 1);
        assert_eq!(c.cached_lists().await, 2);
        assert_eq!(c.current_status(), CombinerStatus::Finished { rows: 1 });
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let freq = MockFrequencyService::new()
            .with_list("A", items(&[("x", 3)]))
            .with_list("B", items(&[("x", 2)]));
        let watcher = TaskWatcher::new(Arc::new(MockTaskFeed::new()), WatcherConfig::default());
        let c = ParadigmaticCombiner::with_cache_capacity(Arc::new(freq.clone()), watcher, 1);

        assert_eq!(c.evaluate(&spec()).await.unwrap().len(), 1);
        assert_eq!(c.cached_lists().await, 1);

        // B survived as most recent; only A is fetched again
        assert_eq!(c.evaluate(&spec()).await.unwrap().len(), 1);
        assert_eq!(freq.freq_call_count("A"), 2);
        assert_eq!(freq.freq_call_count("B"), 1);
    }

    #[tokio::test]
    async fn test_unavailable_service_propagates() {
        let freq = MockFrequencyService::new()
            .with_list("A", items(&[("x", 1)]))
            .with_unavailable("B");
        let c = combiner(&freq, MockTaskFeed::new());
        let err = c.evaluate(&spec()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(c.current_status(), CombinerStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_empty_required_list_is_empty_result() {
        let freq = MockFrequencyService::new().with_list("A", items(&[("x", 3)]));
        let c = combiner(&freq, MockTaskFeed::new());
        let result = c.evaluate(&spec()).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(c.current_status(), CombinerStatus::Finished { rows: 0 });
    }
}
