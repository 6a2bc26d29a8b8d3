//! Persistence codec: operation form parameters <-> opaque persisted ids.
//!
//! Both directions are remote calls. The codec adds a short-lived LRU cache
//! so repeated decodes within one page view do not re-fetch, and retries
//! `Unavailable` failures of idempotent calls once.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `CONCORDIA_CODEC_CACHE_SIZE`: cached descriptors (default: 256)
//! - `CONCORDIA_CODEC_CACHE_TTL_SECS`: cache lifetime in seconds (default: 300)

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use concordia_core::defaults;
use concordia_core::{Error, OperationStore, PersistedId, PersistedOperation, QueryOperation, Result};

/// Codec configuration.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    /// Extra attempts for decode/ancestry calls failing with `Unavailable`.
    pub unavailable_retries: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            cache_capacity: defaults::CODEC_CACHE_CAPACITY,
            cache_ttl_secs: defaults::CODEC_CACHE_TTL_SECS,
            unavailable_retries: defaults::CODEC_UNAVAILABLE_RETRIES,
        }
    }
}

impl CodecConfig {
    pub fn from_env() -> Self {
        let cache_capacity = std::env::var("CONCORDIA_CODEC_CACHE_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::CODEC_CACHE_CAPACITY);

        let cache_ttl_secs = std::env::var("CONCORDIA_CODEC_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::CODEC_CACHE_TTL_SECS);

        Self {
            cache_capacity,
            cache_ttl_secs,
            unavailable_retries: defaults::CODEC_UNAVAILABLE_RETRIES,
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn with_unavailable_retries(mut self, retries: u32) -> Self {
        self.unavailable_retries = retries;
        self
    }
}

struct CachedDescriptor {
    op: PersistedOperation,
    fetched_at: Instant,
}

/// Client-side codec over a remote [`OperationStore`].
pub struct PersistenceCodec {
    store: Arc<dyn OperationStore>,
    cache: Mutex<LruCache<PersistedId, CachedDescriptor>>,
    config: CodecConfig,
}

impl PersistenceCodec {
    pub fn new(store: Arc<dyn OperationStore>, config: CodecConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            cache: Mutex::new(LruCache::new(capacity)),
            config,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Persist an operation; returns the server-assigned id.
    ///
    /// Not retried: a repeated encode would create a second stored
    /// operation.
    #[instrument(skip(self, op), fields(kind = %op.kind))]
    pub async fn encode(
        &self,
        op: &QueryOperation,
        predecessor: Option<&PersistedId>,
    ) -> Result<PersistedId> {
        if let Some(existing) = op.persisted_id() {
            return Err(Error::AlreadyPersisted(existing.to_string()));
        }
        let id = self
            .store
            .encode(op.kind, &op.form_args, predecessor)
            .await?;
        debug!(persisted_id = %id, "Operation encoded");

        let descriptor = PersistedOperation {
            id: id.clone(),
            kind: op.kind,
            form_args: op.form_args.clone(),
            predecessor_id: predecessor.cloned(),
            result_size: op.result_size,
            created_at: Some(op.created_at),
        };
        self.remember(descriptor).await;
        Ok(id)
    }

    /// Load an operation descriptor, from cache when fresh.
    ///
    /// `NotFound` is returned as-is; `Unavailable` is retried.
    #[instrument(skip(self), fields(persisted_id = %id))]
    pub async fn decode(&self, id: &PersistedId) -> Result<PersistedOperation> {
        if let Some(op) = self.cached(id).await {
            debug!(cache_hit = true, "Decoded from cache");
            return Ok(op);
        }
        let op = self
            .with_retry("decode", id, || self.store.decode(id))
            .await?;
        if op.id != *id {
            return Err(Error::CorruptChain(format!(
                "store answered {} for {}",
                op.id, id
            )));
        }
        self.remember(op.clone()).await;
        Ok(op)
    }

    /// Ordered ancestry (root first, `id` last) as reported by the store.
    pub async fn ancestry(&self, id: &PersistedId) -> Result<Vec<PersistedId>> {
        self.with_retry("list_ancestry", id, || self.store.list_ancestry(id))
            .await
    }

    /// Drop one cached descriptor.
    pub async fn invalidate(&self, id: &PersistedId) {
        self.cache.lock().await.pop(id);
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    async fn cached(&self, id: &PersistedId) -> Option<PersistedOperation> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let mut cache = self.cache.lock().await;
        match cache.get(id) {
            Some(entry) if entry.fetched_at.elapsed() < ttl => Some(entry.op.clone()),
            Some(_) => {
                cache.pop(id);
                None
            }
            None => None,
        }
    }

    async fn remember(&self, op: PersistedOperation) {
        let mut cache = self.cache.lock().await;
        cache.put(
            op.id.clone(),
            CachedDescriptor {
                op,
                fetched_at: Instant::now(),
            },
        );
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, id: &PersistedId, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Err(e) if e.is_retryable() && attempt <= self.config.unavailable_retries => {
                    warn!(op, persisted_id = %id, attempt, error = %e, "Transient failure, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
