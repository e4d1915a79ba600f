//! docindex-core
//!
//! Document model, schema registry, filter grammar and the backend capability
//! trait shared by the storage backends and the lifecycle service.
#![deny(unused_imports)]

pub mod chunking;
pub mod config;
pub mod error;
pub mod filter;
pub mod memory;
pub mod schema;
pub mod traits;
pub mod types;

pub use error::{IndexError, Result};
pub use filter::Filter;
pub use memory::MemoryBackend;
pub use schema::{FieldSpec, FieldType, IndexSchema, SchemaRegistry};
pub use traits::{IdentityProvider, ResultCursor, SearchBackend, StaticIdentity};
pub use types::{
    BatchItemResult, FacetCount, FieldValue, IndexedDocument, OperationOutcome, OutcomeError, SearchResult,
};
