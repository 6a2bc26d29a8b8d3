//! Ordered operation chain from a root query to the displayed result.
//!
//! Operations are held behind `Arc`, so chains derived from one another
//! (appends, truncations, edit branches) share their common prefix instead
//! of copying it. A chain never mutates an operation it already holds.

use std::sync::Arc;

use concordia_core::{Error, OperationKind, PersistedId, QueryOperation, Result};

/// Strictly linear sequence of query operations; index 0 is the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationChain {
    ops: Vec<Arc<QueryOperation>>,
}

impl OperationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain by appending `ops` in order, validating every step.
    pub fn from_operations(ops: impl IntoIterator<Item = QueryOperation>) -> Result<Self> {
        let mut chain = Self::new();
        for op in ops {
            chain.append(op)?;
        }
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueryOperation> {
        self.ops.get(index).map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryOperation> {
        self.ops.iter().map(Arc::as_ref)
    }

    pub fn root(&self) -> Result<&QueryOperation> {
        self.get(0).ok_or(Error::EmptyChain)
    }

    /// The operation whose result is currently displayed.
    pub fn current_tail(&self) -> Result<&QueryOperation> {
        self.ops.last().map(Arc::as_ref).ok_or(Error::EmptyChain)
    }

    /// Persisted ids of all operations that have one, root first.
    pub fn persisted_ids(&self) -> Vec<PersistedId> {
        self.iter().filter_map(|op| op.persisted_id().cloned()).collect()
    }

    /// Index of the last operation of `kind`.
    pub fn find_last(&self, kind: OperationKind) -> Option<usize> {
        self.ops.iter().rposition(|op| op.kind == kind)
    }

    /// Check that an operation of `kind` may become the new tail.
    ///
    /// Root kinds only start a chain; concordance steps only follow a
    /// chain rooted at `query`.
    pub fn can_append(&self, kind: OperationKind) -> Result<()> {
        let allowed = match self.ops.first() {
            None => kind.is_root(),
            Some(root) => root.kind == OperationKind::Query && kind.is_concordance_step(),
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidPredecessor { kind })
        }
    }

    /// Add a new tail. Prior entries are untouched.
    pub fn append(&mut self, op: QueryOperation) -> Result<()> {
        self.can_append(op.kind)?;
        self.ops.push(Arc::new(op));
        Ok(())
    }

    /// Copy of this chain with `op` appended.
    pub fn with_appended(&self, op: QueryOperation) -> Result<Self> {
        let mut next = self.clone();
        next.append(op)?;
        Ok(next)
    }

    /// New chain holding operations `0..=index`.
    pub fn truncate_after(&self, index: usize) -> Result<Self> {
        if index >= self.ops.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.ops.len(),
            });
        }
        Ok(Self {
            ops: self.ops[..=index].to_vec(),
        })
    }

    /// New chain whose tail carries the computed result size.
    pub fn with_tail_result_size(&self, size: u64) -> Result<Self> {
        let tail = self.current_tail()?.clone().with_result_size(size);
        let mut ops = self.ops.clone();
        if let Some(last) = ops.last_mut() {
            *last = Arc::new(tail);
        }
        Ok(Self { ops })
    }

    /// Whether the first `len` operations are the very same allocations in
    /// both chains.
    pub fn shares_prefix_with(&self, other: &OperationChain, len: usize) -> bool {
        len <= self.ops.len()
            && len <= other.ops.len()
            && self.ops[..len]
                .iter()
                .zip(&other.ops[..len])
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}
