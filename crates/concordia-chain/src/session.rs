//! Session-scoped context owning the live chain of one page session.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, instrument, warn};

use concordia_core::{
    Error, HistoryApi, OperationStore, PersistedId, QueryOperation, Result,
};

use crate::chain::OperationChain;
use crate::codec::{CodecConfig, PersistenceCodec};
use crate::history::HistoryStore;
use crate::replay::{reconstruct, ReplayEngine, ReplayState};

/// Result of [`Session::open`].
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedChain {
    pub chain: OperationChain,
    /// Set when the full chain could not be restored and the session fell
    /// back to the root operation.
    pub recovered_from: Option<Error>,
}

impl OpenedChain {
    pub fn is_fallback(&self) -> bool {
        self.recovered_from.is_some()
    }
}

/// Owns the live chain, its edit state, the codec and the history store.
///
/// Appends are serialized: while one submission is waiting on the
/// operation store, another fails fast with `SubmitInProgress`.
pub struct Session {
    codec: Arc<PersistenceCodec>,
    history: Mutex<HistoryStore>,
    replay: RwLock<ReplayEngine>,
    submit_gate: Mutex<()>,
}

impl Session {
    pub fn new(
        store: Arc<dyn OperationStore>,
        history_api: Arc<dyn HistoryApi>,
        codec_config: CodecConfig,
    ) -> Self {
        Self::with_codec(Arc::new(PersistenceCodec::new(store, codec_config)), history_api)
    }

    pub fn with_codec(codec: Arc<PersistenceCodec>, history_api: Arc<dyn HistoryApi>) -> Self {
        Self {
            codec,
            history: Mutex::new(HistoryStore::new(history_api)),
            replay: RwLock::new(ReplayEngine::default()),
            submit_gate: Mutex::new(()),
        }
    }

    pub fn codec(&self) -> &Arc<PersistenceCodec> {
        &self.codec
    }

    /// Exclusive access to the history store.
    pub async fn history(&self) -> MutexGuard<'_, HistoryStore> {
        self.history.lock().await
    }

    /// Snapshot of the displayed chain.
    pub async fn chain(&self) -> OperationChain {
        self.replay.read().await.chain().clone()
    }

    pub async fn state(&self) -> ReplayState {
        self.replay.read().await.state()
    }

    /// Append a new operation to the displayed chain.
    ///
    /// The operation is validated before the store is contacted, persisted
    /// with the current tail as predecessor, appended, and recorded in
    /// history. A history failure is returned after the chain has been
    /// updated.
    #[instrument(skip(self, op), fields(kind = %op.kind))]
    pub async fn submit(&self, op: QueryOperation) -> Result<OperationChain> {
        let _gate = self
            .submit_gate
            .try_lock()
            .map_err(|_| Error::SubmitInProgress)?;

        let (current, state) = {
            let replay = self.replay.read().await;
            (replay.chain().clone(), replay.state())
        };
        if state != ReplayState::Viewing {
            return Err(Error::InvalidInput(
                "submit or cancel the pending edit first".to_string(),
            ));
        }
        current.can_append(op.kind)?;
        let predecessor = tail_id(&current)?;

        let id = self.codec.encode(&op, predecessor.as_ref()).await?;
        let next = current.with_appended(op.with_persisted_id(id.clone())?)?;
        self.replay.write().await.replace_chain(next.clone());
        info!(persisted_id = %id, chain_len = next.len(), "Operation submitted");

        self.history.lock().await.record(&next).await?;
        Ok(next)
    }

    pub async fn begin_edit(&self, index: usize) -> Result<()> {
        self.replay.write().await.begin_edit(index)
    }

    pub async fn cancel_edit(&self) -> Result<()> {
        self.replay.write().await.cancel_edit()
    }

    /// Submit the revision of the operation being edited as a new branch.
    ///
    /// The chain stays readable while the revision is persisted. Cancelling
    /// the edit in the meantime makes this call fail and keeps the chain.
    #[instrument(skip(self, revised), fields(kind = %revised.kind))]
    pub async fn submit_edit(&self, revised: QueryOperation) -> Result<OperationChain> {
        let _gate = self
            .submit_gate
            .try_lock()
            .map_err(|_| Error::SubmitInProgress)?;

        let pending = self.replay.read().await.prepare_edit(revised)?;
        let id = self
            .codec
            .encode(pending.operation(), pending.predecessor())
            .await?;
        let branched = self.replay.write().await.commit_edit(pending, id)?;

        self.history.lock().await.record(&branched).await?;
        Ok(branched)
    }

    /// Attach the computed result size to the displayed tail.
    pub async fn attach_result_size(&self, size: u64) -> Result<()> {
        self.replay.write().await.attach_result_size(size)
    }

    /// Load the chain ending at `id` as the displayed chain.
    ///
    /// `NotFound` and `CorruptChain` fall back to the decodable root of the
    /// ancestry; if there is none the original error is returned. Opening
    /// while a submission is outstanding fails with `SubmitInProgress`.
    #[instrument(skip(self), fields(persisted_id = %id))]
    pub async fn open(&self, id: &PersistedId) -> Result<OpenedChain> {
        let _gate = self
            .submit_gate
            .try_lock()
            .map_err(|_| Error::SubmitInProgress)?;

        let opened = match reconstruct(&self.codec, id).await {
            Ok(chain) => OpenedChain {
                chain,
                recovered_from: None,
            },
            Err(e @ (Error::NotFound(_) | Error::CorruptChain(_))) => {
                let chain = self.root_fallback(id).await.ok_or_else(|| e.clone())?;
                warn!(error = %e, "Chain not restorable, starting over from root");
                OpenedChain {
                    chain,
                    recovered_from: Some(e),
                }
            }
            Err(e) => return Err(e),
        };
        self.replay.write().await.replace_chain(opened.chain.clone());
        Ok(opened)
    }

    async fn root_fallback(&self, id: &PersistedId) -> Option<OperationChain> {
        let ancestry = self.codec.ancestry(id).await.ok()?;
        let root_id = ancestry.first()?;
        let root = self.codec.decode(root_id).await.ok()?;
        if root.predecessor_id.is_some() {
            return None;
        }
        OperationChain::from_operations(vec![root.to_operation()]).ok()
    }
}

fn tail_id(chain: &OperationChain) -> Result<Option<PersistedId>> {
    match chain.current_tail() {
        Ok(tail) => tail
            .persisted_id()
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::InvalidInput("chain tail is not persisted".to_string())),
        Err(Error::EmptyChain) => Ok(None),
        Err(e) => Err(e),
    }
}
