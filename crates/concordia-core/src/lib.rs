//! # concordia-core
//!
//! Core types, traits, and abstractions for the concordia query workbench
//! client.
//!
//! This crate provides the data model of query operations, history entries,
//! paradigmatic queries and background tasks, the error taxonomy, and the
//! traits describing the remote services every other crate talks to.

pub mod defaults;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
