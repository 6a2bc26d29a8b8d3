//! # concordia-tasks
//!
//! Background task tracking for concordia.
//!
//! Long-running server computations (large paradigmatic queries, word
//! lists) answer with a task handle. This crate polls the task status feed
//! until the task is `Finished` or `Failed`.
//!
//! ## Example
//!
//! ```ignore
//! use concordia_tasks::{TaskWatcher, WatcherConfig};
//!
//! let watcher = TaskWatcher::new(feed, WatcherConfig::from_env());
//! let mut events = watcher.events();
//! let info = watcher.wait_for(&handle).await?;
//! println!("result at {:?}", info.result_ref);
//! ```

pub mod watcher;

pub use watcher::{TaskEvent, TaskWatcher, WatcherConfig};

/// Default polling interval of the status feed (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = concordia_core::defaults::TASK_POLL_INTERVAL_MS;

/// Default number of polls a task may be missing from the feed.
pub const DEFAULT_MISSING_GRACE_POLLS: u32 = concordia_core::defaults::TASK_MISSING_GRACE_POLLS;
