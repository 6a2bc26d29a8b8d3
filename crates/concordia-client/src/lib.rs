//! # concordia-client
//!
//! HTTP implementations of the remote collaborators (operation store,
//! history API, frequency service, task feed) on top of `reqwest`, and the
//! `concordia` command-line binary.
//!
//! ## Configuration
//!
//! See [`ClientConfig::from_env`]. Transport failures and 5xx responses
//! map to `Error::Unavailable`, 404/410 to `Error::NotFound`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use concordia_client::ConcordiaClient;
//! use concordia_chain::{CodecConfig, Session};
//!
//! let client = Arc::new(ConcordiaClient::from_env()?);
//! let session = Session::new(client.clone(), client, CodecConfig::from_env());
//! ```

pub mod client;
pub mod config;
pub mod error;
mod freq;
mod history;
mod store;

pub use client::ConcordiaClient;
pub use config::ClientConfig;
