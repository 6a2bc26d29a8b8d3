//! # concordia-pquery
//!
//! Paradigmatic queries: N sub-queries over one attribute, each yielding a
//! frequency list, combined by intersection of the required sub-queries
//! minus the values of the negated ones.
//!
//! - [`combine`]: the pure set combination
//! - [`PQueryResult`]: immutable rows with sort, page and CSV views
//! - [`ParadigmaticCombiner`]: fetches lists (waiting on background tasks),
//!   caches them and publishes [`CombinerStatus`]
//!
//! ## Example
//!
//! ```ignore
//! use concordia_pquery::{ParadigmaticCombiner, SortColumn};
//!
//! let combiner = ParadigmaticCombiner::new(freq_service, watcher);
//! let result = combiner.evaluate(&spec).await?;
//! let page = result.toggled(SortColumn::Value)?.page(1, 20)?;
//! println!("{}", page.indicator());
//! ```

pub mod combine;
pub mod combiner;
pub mod result;

pub use combine::combine;
pub use combiner::{CombinerStatus, ParadigmaticCombiner};
pub use result::{PQueryPage, PQueryResult, SortColumn, SortDirection, SortState};

/// Default number of result rows per page.
pub const DEFAULT_PAGE_SIZE: usize = concordia_core::defaults::PQUERY_PAGE_SIZE;
