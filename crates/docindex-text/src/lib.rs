//! docindex-text
//!
//! Tantivy-backed implementation of the search backend capability. See
//! `index` for provisioning and batch writes and `search` for query execution.
pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::TantivyBackend;
