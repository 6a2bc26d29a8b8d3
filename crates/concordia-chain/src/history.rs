//! Client-side view of the query history log.
//!
//! The server owns the entries. `HistoryStore` keeps the last listed page,
//! applies optimistic removal on delete, and holds the undo token of the
//! most recent delete until the next successful listing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use concordia_core::{
    Error, HistoryApi, HistoryEntry, HistoryFilter, HistoryPage, NewHistoryEntry, PersistedId,
    Result,
};

use crate::chain::OperationChain;

/// Handle for reverting one soft delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UndoToken(Uuid);

impl UndoToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UndoToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct PendingUndo {
    token: UndoToken,
    entry_id: String,
    /// Position and content in the last listed page, if it was shown there.
    removed: Option<(usize, HistoryEntry)>,
}

/// Filterable, archivable history log backed by a remote [`HistoryApi`].
pub struct HistoryStore {
    api: Arc<dyn HistoryApi>,
    last_filter: Option<HistoryFilter>,
    last_page: Option<HistoryPage>,
    pending_undo: Option<PendingUndo>,
    /// Entries this client deleted; hidden even if a listing races the delete.
    tombstones: HashSet<String>,
    /// Tail persisted id -> entry id, for chains recorded in this session.
    recorded: HashMap<PersistedId, String>,
}

impl HistoryStore {
    pub fn new(api: Arc<dyn HistoryApi>) -> Self {
        Self {
            api,
            last_filter: None,
            last_page: None,
            pending_undo: None,
            tombstones: HashSet::new(),
            recorded: HashMap::new(),
        }
    }

    /// The most recently listed page, with local edits applied.
    pub fn last_page(&self) -> Option<&HistoryPage> {
        self.last_page.as_ref()
    }

    pub fn has_pending_undo(&self) -> bool {
        self.pending_undo.is_some()
    }

    /// List entries, newest first.
    ///
    /// A successful listing makes any outstanding undo token stale.
    #[instrument(skip(self, filter), fields(page = filter.page, page_size = filter.page_size))]
    pub async fn list(&mut self, filter: &HistoryFilter) -> Result<HistoryPage> {
        filter.validate()?;
        let mut page = self.api.list(filter).await?;

        if let Some(stale) = self.pending_undo.take() {
            debug!(entry_id = %stale.entry_id, "Discarding undo token");
        }

        let before = page.entries.len();
        let tombstones = &self.tombstones;
        page.entries
            .retain(|e| filter.matches(e) && !tombstones.contains(&e.id));
        let hidden = before - page.entries.len();
        page.total = page.total.saturating_sub(hidden);
        refresh_has_more(&mut page);

        debug!(result_count = page.entries.len(), total = page.total, "History listed");
        self.last_filter = Some(filter.clone());
        self.last_page = Some(page.clone());
        Ok(page)
    }

    /// Mark an entry archived. Archiving an archived entry succeeds.
    pub async fn archive(&mut self, entry_id: &str) -> Result<()> {
        self.set_archived(entry_id, true).await
    }

    /// Clear the archived flag. Unarchiving an unarchived entry succeeds.
    pub async fn unarchive(&mut self, entry_id: &str) -> Result<()> {
        self.set_archived(entry_id, false).await
    }

    async fn set_archived(&mut self, entry_id: &str, archived: bool) -> Result<()> {
        require_id(entry_id)?;
        self.api.set_archived(entry_id, archived).await?;
        debug!(entry_id, archived, "Archive flag set");

        if let (Some(page), Some(filter)) = (self.last_page.as_mut(), self.last_filter.as_ref()) {
            if let Some(pos) = page.entries.iter().position(|e| e.id == entry_id) {
                page.entries[pos].archived = archived;
                if !filter.matches(&page.entries[pos]) {
                    page.entries.remove(pos);
                    page.total = page.total.saturating_sub(1);
                    refresh_has_more(page);
                }
            }
        }
        Ok(())
    }

    /// Tombstone an entry and return the token that reverts it.
    ///
    /// Only the token of the latest delete is honoured.
    #[instrument(skip(self))]
    pub async fn soft_delete(&mut self, entry_id: &str) -> Result<UndoToken> {
        require_id(entry_id)?;
        self.api.soft_delete(entry_id).await?;
        self.tombstones.insert(entry_id.to_string());

        let removed = self.last_page.as_mut().and_then(|page| {
            let pos = page.entries.iter().position(|e| e.id == entry_id)?;
            page.total = page.total.saturating_sub(1);
            refresh_has_more(page);
            Some((pos, page.entries.remove(pos)))
        });

        let token = UndoToken::new();
        self.pending_undo = Some(PendingUndo {
            token,
            entry_id: entry_id.to_string(),
            removed,
        });
        info!(entry_id, "History entry deleted");
        Ok(token)
    }

    /// Revert the delete `token` was issued for.
    ///
    /// Returns `false` without contacting the server when the token is
    /// stale (a listing or a newer delete happened since).
    #[instrument(skip(self))]
    pub async fn undo(&mut self, token: UndoToken) -> Result<bool> {
        let entry_id = match &self.pending_undo {
            Some(pending) if pending.token == token => pending.entry_id.clone(),
            _ => {
                debug!("Undo token is stale");
                return Ok(false);
            }
        };

        self.api.restore(&entry_id).await?;
        self.tombstones.remove(&entry_id);

        if let Some(PendingUndo {
            removed: Some((pos, entry)),
            ..
        }) = self.pending_undo.take()
        {
            if let Some(page) = self.last_page.as_mut() {
                let pos = pos.min(page.entries.len());
                page.entries.insert(pos, entry);
                page.total += 1;
                refresh_has_more(page);
            }
        }
        info!(entry_id = %entry_id, "History entry restored");
        Ok(true)
    }

    /// Set the user label; a blank label resets to the generated
    /// description.
    pub async fn rename(&mut self, entry_id: &str, label: &str) -> Result<()> {
        require_id(entry_id)?;
        let label = Some(label.trim()).filter(|l| !l.is_empty());
        self.api.rename(entry_id, label).await?;

        if let Some(page) = self.last_page.as_mut() {
            if let Some(entry) = page.entries.iter_mut().find(|e| e.id == entry_id) {
                entry.label = label.map(str::to_string);
            }
        }
        debug!(entry_id, reset = label.is_none(), "History entry renamed");
        Ok(())
    }

    /// Record the persisted tail of `chain`.
    ///
    /// A chain gets one entry. When the previous tail was recorded in this
    /// session, that entry is moved to the new tail; otherwise (a new root,
    /// or a branch off an earlier operation) a new entry is created.
    /// Returns `None` if the tail is already recorded.
    #[instrument(skip(self, chain), fields(chain_len = chain.len()))]
    pub async fn record(&mut self, chain: &OperationChain) -> Result<Option<HistoryEntry>> {
        let tail = chain.current_tail()?;
        let query_id = tail
            .persisted_id()
            .cloned()
            .ok_or_else(|| Error::InvalidInput("chain tail is not persisted".to_string()))?;
        if self.recorded.contains_key(&query_id) {
            debug!(persisted_id = %query_id, "Already recorded");
            return Ok(None);
        }

        let new_entry = NewHistoryEntry {
            query_id: query_id.clone(),
            root_kind: chain.root()?.kind,
            kind: tail.kind,
            form_args: tail.form_args.clone(),
        };
        let previous = chain
            .len()
            .checked_sub(2)
            .and_then(|i| chain.get(i))
            .and_then(|op| op.persisted_id())
            .and_then(|id| self.recorded.remove_entry(id));

        let entry = match previous {
            Some((previous_id, entry_id)) => {
                match self.api.update_tail(&entry_id, new_entry).await {
                    Ok(entry) => {
                        debug!(entry_id = %entry.id, "History entry moved to new tail");
                        entry
                    }
                    Err(e) => {
                        self.recorded.insert(previous_id, entry_id);
                        return Err(e);
                    }
                }
            }
            None => {
                let entry = self.api.record(new_entry).await?;
                debug!(entry_id = %entry.id, "History entry recorded");
                entry
            }
        };
        self.recorded.insert(query_id, entry.id.clone());

        if let Some(page) = self.last_page.as_mut() {
            if let Some(shown) = page.entries.iter_mut().find(|e| e.id == entry.id) {
                *shown = entry.clone();
            }
        }
        Ok(Some(entry))
    }
}

fn refresh_has_more(page: &mut HistoryPage) {
    page.has_more = page.page.saturating_mul(page.page_size) < page.total;
}

fn require_id(entry_id: &str) -> Result<()> {
    if entry_id.trim().is_empty() {
        return Err(Error::InvalidInput("empty history entry id".to_string()));
    }
    Ok(())
}
