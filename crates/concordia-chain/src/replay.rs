//! Replay: chain reconstruction from a persisted tail, and edit-and-branch.
//!
//! The edit state machine is a pure transition function,
//! [`ReplayState::apply`]. [`ReplayEngine`] couples it with the chain it
//! edits and performs the single network call an edit submission needs.

use std::collections::HashSet;

use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use concordia_core::{Error, PersistedId, QueryOperation, Result};

use crate::chain::OperationChain;
use crate::codec::PersistenceCodec;

/// Edit state of a displayed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayState {
    /// The chain fully reflects persisted history.
    #[default]
    Viewing,
    /// The operation at `index` is being revised; later operations are
    /// provisionally discarded.
    Editing { index: usize },
}

/// User actions driving [`ReplayState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayAction {
    Edit(usize),
    Cancel,
    Submitted,
}

impl ReplayState {
    /// Transition for `action` on a chain of `chain_len` operations.
    pub fn apply(self, action: ReplayAction, chain_len: usize) -> Result<ReplayState> {
        match (self, action) {
            (ReplayState::Viewing, ReplayAction::Edit(index)) => {
                if index >= chain_len {
                    return Err(Error::IndexOutOfRange {
                        index,
                        len: chain_len,
                    });
                }
                Ok(ReplayState::Editing { index })
            }
            (ReplayState::Editing { .. }, ReplayAction::Cancel)
            | (ReplayState::Editing { .. }, ReplayAction::Submitted) => Ok(ReplayState::Viewing),
            (state, action) => Err(Error::InvalidInput(format!(
                "cannot apply {:?} while {:?}",
                action, state
            ))),
        }
    }

    pub fn editing_index(&self) -> Option<usize> {
        match self {
            ReplayState::Editing { index } => Some(*index),
            ReplayState::Viewing => None,
        }
    }
}

/// Holds the displayed chain and its edit state.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    chain: OperationChain,
    state: ReplayState,
}

impl ReplayEngine {
    pub fn new(chain: OperationChain) -> Self {
        Self {
            chain,
            state: ReplayState::Viewing,
        }
    }

    pub fn chain(&self) -> &OperationChain {
        &self.chain
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Replace the displayed chain, leaving any edit.
    pub fn replace_chain(&mut self, chain: OperationChain) {
        self.chain = chain;
        self.state = ReplayState::Viewing;
    }

    /// Record the computed result size on the displayed tail.
    pub fn attach_result_size(&mut self, size: u64) -> Result<()> {
        self.chain = self.chain.with_tail_result_size(size)?;
        Ok(())
    }

    pub fn begin_edit(&mut self, index: usize) -> Result<()> {
        self.state = self.state.apply(ReplayAction::Edit(index), self.chain.len())?;
        debug!(index, chain_len = self.chain.len(), "Editing operation");
        Ok(())
    }

    /// Leave editing; the chain is exactly as before the edit began.
    pub fn cancel_edit(&mut self) -> Result<()> {
        self.state = self.state.apply(ReplayAction::Cancel, self.chain.len())?;
        Ok(())
    }

    /// The chain as it stands while editing: operations before the edited
    /// one. Equals the full chain when not editing.
    pub fn provisional_chain(&self) -> Result<OperationChain> {
        match self.state {
            ReplayState::Viewing => Ok(self.chain.clone()),
            ReplayState::Editing { index } => self.base_for(index),
        }
    }

    fn base_for(&self, index: usize) -> Result<OperationChain> {
        if index == 0 {
            Ok(OperationChain::new())
        } else {
            self.chain.truncate_after(index - 1)
        }
    }

    /// Validate a revision of the edited operation against the truncated
    /// chain. No network call happens here.
    pub fn prepare_edit(&self, revised: QueryOperation) -> Result<PendingEdit> {
        let index = self.state.editing_index().ok_or_else(|| {
            Error::InvalidInput("no operation is being edited".to_string())
        })?;
        let base = self.base_for(index)?;
        base.can_append(revised.kind)?;

        let predecessor = match base.current_tail() {
            Ok(tail) => Some(tail.persisted_id().cloned().ok_or_else(|| {
                Error::InvalidInput("edited chain has an unpersisted operation".to_string())
            })?),
            Err(_) => None,
        };
        let revised = if revised.is_persisted() {
            revised.revise(revised.form_args.clone())
        } else {
            revised
        };
        Ok(PendingEdit {
            index,
            base,
            predecessor,
            revised,
        })
    }

    /// Install the branch for a prepared edit once its operation is stored
    /// as `id`.
    ///
    /// Fails if the edit was cancelled or the chain was replaced while the
    /// operation was being persisted; the displayed chain is then kept.
    pub fn commit_edit(&mut self, pending: PendingEdit, id: PersistedId) -> Result<OperationChain> {
        let still_editing = self.state == ReplayState::Editing { index: pending.index }
            && self
                .chain
                .shares_prefix_with(&pending.base, pending.base.len());
        if !still_editing {
            return Err(Error::InvalidInput(format!(
                "edit at {} was abandoned before {} was stored",
                pending.index, id
            )));
        }

        let branched = pending
            .base
            .with_appended(pending.revised.with_persisted_id(id.clone())?)?;
        self.state = self.state.apply(ReplayAction::Submitted, self.chain.len())?;
        self.chain = branched.clone();
        info!(
            persisted_id = %id,
            index = pending.index,
            chain_len = branched.len(),
            "Chain branched"
        );
        Ok(branched)
    }

    /// Submit the revised operation, producing a new branch.
    ///
    /// The revision is validated against the truncated chain before any
    /// network call. On failure the engine stays in `Editing` with the old
    /// chain intact.
    #[instrument(skip(self, codec, revised), fields(kind = %revised.kind))]
    pub async fn submit_edit(
        &mut self,
        codec: &PersistenceCodec,
        revised: QueryOperation,
    ) -> Result<OperationChain> {
        let pending = self.prepare_edit(revised)?;
        let id = codec
            .encode(pending.operation(), pending.predecessor())
            .await?;
        self.commit_edit(pending, id)
    }
}

/// A validated edit waiting for its operation to be stored.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    index: usize,
    base: OperationChain,
    predecessor: Option<PersistedId>,
    revised: QueryOperation,
}

impl PendingEdit {
    /// The operation to persist.
    pub fn operation(&self) -> &QueryOperation {
        &self.revised
    }

    /// Tail of the truncated chain; `None` when the root is edited.
    pub fn predecessor(&self) -> Option<&PersistedId> {
        self.predecessor.as_ref()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Recover the full chain ending at `tail_id`.
///
/// The server ancestry must list distinct ids, root first, ending at
/// `tail_id`, each operation naming the previous one as predecessor.
/// Anything else is `CorruptChain`; a partial chain is never returned.
#[instrument(skip(codec), fields(persisted_id = %tail_id))]
pub async fn reconstruct(codec: &PersistenceCodec, tail_id: &PersistedId) -> Result<OperationChain> {
    let ancestry = codec.ancestry(tail_id).await?;

    if ancestry.is_empty() {
        return Err(Error::CorruptChain(format!("empty ancestry for {}", tail_id)));
    }
    if ancestry.last() != Some(tail_id) {
        return Err(Error::CorruptChain(format!(
            "ancestry of {} does not end at it",
            tail_id
        )));
    }
    let mut seen = HashSet::with_capacity(ancestry.len());
    for id in &ancestry {
        if !seen.insert(id) {
            return Err(Error::CorruptChain(format!("cycle at {}", id)));
        }
    }

    let descriptors = try_join_all(ancestry.iter().map(|id| codec.decode(id))).await?;

    let mut previous: Option<&PersistedId> = None;
    for descriptor in &descriptors {
        if descriptor.predecessor_id.as_ref() != previous {
            return Err(Error::CorruptChain(format!(
                "{} does not follow {}",
                descriptor.id,
                previous.map(|p| p.as_str()).unwrap_or("<root>")
            )));
        }
        previous = Some(&descriptor.id);
    }

    let chain = OperationChain::from_operations(descriptors.iter().map(|d| d.to_operation()))
        .map_err(|e| Error::CorruptChain(format!("invalid operation sequence: {}", e)))?;
    debug!(chain_len = chain.len(), "Chain reconstructed");
    Ok(chain)
}
