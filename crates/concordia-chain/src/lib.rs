//! # concordia-chain
//!
//! The query-operation chain: an ordered investigation from a root query to
//! the displayed result, persisted step by step as opaque ids.
//!
//! - [`PersistenceCodec`]: operation <-> persisted id, with a short-lived
//!   decode cache
//! - [`OperationChain`]: append-only chain with structural sharing
//! - [`ReplayEngine`] and [`reconstruct`]: edit-and-branch, rebuild from a
//!   tail id
//! - [`HistoryStore`]: filterable, archivable history with undoable deletes
//! - [`Session`]: the session-scoped owner of all of the above
//!
//! ## Example
//!
//! ```ignore
//! use concordia_chain::{CodecConfig, Session};
//!
//! let session = Session::new(store, history_api, CodecConfig::from_env());
//! session.submit(QueryOperation::new(OperationKind::Query, args)).await?;
//! let opened = session.open(&PersistedId::from_url_param("~op0001")?).await?;
//! ```

pub mod chain;
pub mod codec;
pub mod history;
pub mod replay;
pub mod session;

pub use chain::OperationChain;
pub use codec::{CodecConfig, PersistenceCodec};
pub use history::{HistoryStore, UndoToken};
pub use replay::{reconstruct, PendingEdit, ReplayAction, ReplayEngine, ReplayState};
pub use session::{OpenedChain, Session};
