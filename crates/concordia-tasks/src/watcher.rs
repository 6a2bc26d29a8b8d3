//! Task watcher polling the background task status feed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use concordia_core::{Error, Result, TaskHandle, TaskInfo, TaskStatus, TaskStatusFeed};

use crate::{DEFAULT_MISSING_GRACE_POLLS, DEFAULT_POLL_INTERVAL_MS};

/// Configuration for the task watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Interval between two feed reads in milliseconds.
    pub poll_interval_ms: u64,
    /// Consecutive polls a watched task may be missing from the feed.
    pub missing_grace_polls: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            missing_grace_polls: DEFAULT_MISSING_GRACE_POLLS,
        }
    }
}

impl WatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CONCORDIA_TASK_POLL_MS` | `1000` | Feed polling interval |
    /// | `CONCORDIA_TASK_MISSING_POLLS` | `5` | Polls a task may be absent |
    pub fn from_env() -> Self {
        let poll_interval_ms = std::env::var("CONCORDIA_TASK_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(1);

        let missing_grace_polls = std::env::var("CONCORDIA_TASK_MISSING_POLLS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MISSING_GRACE_POLLS);

        Self {
            poll_interval_ms,
            missing_grace_polls,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_missing_grace_polls(mut self, polls: u32) -> Self {
        self.missing_grace_polls = polls;
        self
    }
}

/// Event emitted while watching tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// The feed was read; `pending` tasks are still running.
    Polled { pending: usize },
    /// A watched task finished.
    Finished { task_id: String },
    /// A watched task failed.
    Failed { task_id: String, error: String },
}

/// Waits for server-side background tasks by polling the status feed.
///
/// There is no client-side timeout. Dropping the returned future stops
/// the polling; the server-side computation is unaffected.
#[derive(Clone)]
pub struct TaskWatcher {
    feed: Arc<dyn TaskStatusFeed>,
    config: WatcherConfig,
    event_tx: broadcast::Sender<TaskEvent>,
}

impl TaskWatcher {
    pub fn new(feed: Arc<dyn TaskStatusFeed>, config: WatcherConfig) -> Self {
        let (event_tx, _) = broadcast::channel(concordia_core::defaults::TASK_EVENT_CAPACITY);
        Self {
            feed,
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Get a receiver for watcher events.
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    /// Wait until one task is `Finished`.
    ///
    /// `Failed` is terminal and returned as `Error::TaskFailed`.
    pub async fn wait_for(&self, handle: &TaskHandle) -> Result<TaskInfo> {
        let mut done = self.wait_for_all(std::slice::from_ref(handle)).await?;
        done.pop()
            .ok_or_else(|| Error::NotFound(format!("task {}", handle.task_id)))
    }

    /// Wait until every task is `Finished`, sharing one feed read per poll.
    ///
    /// Results come back in the order of `handles`, one per handle even
    /// when a task id repeats. The first failed task aborts the wait.
    #[instrument(skip(self, handles), fields(task_count = handles.len()))]
    pub async fn wait_for_all(&self, handles: &[TaskHandle]) -> Result<Vec<TaskInfo>> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut finished: HashMap<String, TaskInfo> = HashMap::new();
        let mut missing: HashMap<String, u32> = HashMap::new();
        let mut distinct: Vec<TaskHandle> = Vec::with_capacity(handles.len());
        for handle in handles {
            if !distinct.contains(handle) {
                distinct.push(handle.clone());
            }
        }

        loop {
            match self.feed.list_tasks().await {
                Ok(tasks) => {
                    self.absorb(&distinct, tasks, &mut finished, &mut missing)?;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Task feed unavailable, polling again");
                }
                Err(e) => return Err(e),
            }

            let pending = distinct
                .iter()
                .filter(|h| !finished.contains_key(&h.task_id))
                .count();
            if pending == 0 {
                break;
            }
            let _ = self.event_tx.send(TaskEvent::Polled { pending });
            debug!(pending, "Tasks still running");
            sleep(poll_interval).await;
        }

        info!(
            task_count = distinct.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Background tasks finished"
        );

        handles
            .iter()
            .map(|h| {
                finished
                    .get(&h.task_id)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(format!("task {}", h.task_id)))
            })
            .collect()
    }

    /// Fold one feed snapshot into the wait state.
    fn absorb(
        &self,
        handles: &[TaskHandle],
        tasks: Vec<TaskInfo>,
        finished: &mut HashMap<String, TaskInfo>,
        missing: &mut HashMap<String, u32>,
    ) -> Result<()> {
        let mut by_id: HashMap<String, TaskInfo> = tasks
            .into_iter()
            .map(|t| (t.task_id.clone(), t))
            .collect();

        for handle in handles {
            if finished.contains_key(&handle.task_id) {
                continue;
            }
            match by_id.remove(&handle.task_id) {
                Some(info) => {
                    missing.remove(&handle.task_id);
                    match info.status {
                        TaskStatus::Running => {}
                        TaskStatus::Finished => {
                            debug!(task_id = %handle.task_id, "Task finished");
                            let _ = self.event_tx.send(TaskEvent::Finished {
                                task_id: handle.task_id.clone(),
                            });
                            finished.insert(handle.task_id.clone(), info);
                        }
                        TaskStatus::Failed => {
                            let error = info
                                .error
                                .unwrap_or_else(|| "background task failed".to_string());
                            warn!(task_id = %handle.task_id, %error, "Task failed");
                            let _ = self.event_tx.send(TaskEvent::Failed {
                                task_id: handle.task_id.clone(),
                                error: error.clone(),
                            });
                            return Err(Error::TaskFailed {
                                task_id: handle.task_id.clone(),
                                message: error,
                            });
                        }
                    }
                }
                None => {
                    let count = missing.entry(handle.task_id.clone()).or_insert(0);
                    *count += 1;
                    if *count > self.config.missing_grace_polls {
                        warn!(task_id = %handle.task_id, "Task vanished from status feed");
                        return Err(Error::NotFound(format!("task {}", handle.task_id)));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_core::mock::MockTaskFeed;

    fn handle(id: &str) -> TaskHandle {
        TaskHandle {
            task_id: id.to_string(),
        }
    }

    fn watcher(feed: MockTaskFeed) -> TaskWatcher {
        TaskWatcher::new(
            Arc::new(feed),
            WatcherConfig::default()
                .with_poll_interval(100)
                .with_missing_grace_polls(2),
        )
    }

    #[test]
    fn test_config_builder() {
        let config = WatcherConfig::default()
            .with_poll_interval(250)
            .with_missing_grace_polls(9);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.missing_grace_polls, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_finished_task() {
        let feed = MockTaskFeed::new().with_script(
            "t1",
            vec![TaskStatus::Running, TaskStatus::Running, TaskStatus::Finished],
        );
        let w = watcher(feed.clone());
        let info = w.wait_for(&handle("t1")).await.unwrap();
        assert_eq!(info.status, TaskStatus::Finished);
        assert_eq!(info.result_ref.as_deref(), Some("t1"));
        assert_eq!(feed.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_is_terminal() {
        let feed =
            MockTaskFeed::new().with_script("t1", vec![TaskStatus::Running, TaskStatus::Failed]);
        let w = watcher(feed);
        let err = w.wait_for(&handle("t1")).await.unwrap_err();
        assert_eq!(
            err,
            Error::TaskFailed {
                task_id: "t1".to_string(),
                message: "task failed".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_task_becomes_not_found() {
        let feed = MockTaskFeed::new();
        let w = watcher(feed.clone());
        let err = w.wait_for(&handle("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // grace of 2 polls, failure on the third
        assert_eq!(feed.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_all_preserves_order() {
        let feed = MockTaskFeed::new()
            .with_script("a", vec![TaskStatus::Running, TaskStatus::Finished])
            .with_script("b", vec![TaskStatus::Finished]);
        let w = watcher(feed);
        let infos = w.wait_for_all(&[handle("a"), handle("b")]).await.unwrap();
        let ids: Vec<_> = infos.iter().map(|i| i.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_task_id_answers_every_handle() {
        let feed = MockTaskFeed::new()
            .with_script("batch", vec![TaskStatus::Running, TaskStatus::Finished]);
        let w = watcher(feed.clone());
        let infos = w
            .wait_for_all(&[handle("batch"), handle("batch")])
            .await
            .unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.task_id == "batch"));
        assert_eq!(feed.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_broadcast() {
        let feed =
            MockTaskFeed::new().with_script("t1", vec![TaskStatus::Running, TaskStatus::Finished]);
        let w = watcher(feed);
        let mut events = w.events();
        w.wait_for(&handle("t1")).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), TaskEvent::Polled { pending: 1 });
        assert_eq!(
            events.recv().await.unwrap(),
            TaskEvent::Finished {
                task_id: "t1".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_wait_stops_polling() {
        let feed = MockTaskFeed::new().with_script("t1", vec![TaskStatus::Running]);
        let w = watcher(feed.clone());
        let waited = tokio::time::timeout(Duration::from_millis(350), w.wait_for(&handle("t1"))).await;
        assert!(waited.is_err());
        let polls = feed.poll_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(feed.poll_count(), polls);
    }
}
