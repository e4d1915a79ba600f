use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::filter::Filter;
use crate::schema::IndexSchema;
use crate::types::{BatchItemResult, IndexedDocument, SearchResult};

/// A lazily drained sequence of matches. Items can fail mid-stream.
pub type ResultCursor = BoxStream<'static, Result<SearchResult>>;

/// The search engine the lifecycle service talks to.
///
/// Implementations own their transport and lifetime; the service only holds a
/// shared handle. Batch calls report one [`BatchItemResult`] per submitted
/// document, keyed by document id; callers must not rely on positional order.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch the descriptor of an existing index. Absent indexes yield
    /// [`crate::error::IndexError::NotFound`].
    async fn get_index(&self, name: &str) -> Result<IndexSchema>;

    /// Create an index. An existing index yields
    /// [`crate::error::IndexError::AlreadyExists`].
    async fn create_index(&self, schema: &IndexSchema) -> Result<IndexSchema>;

    /// Free-text search. `None` query text matches everything, `None` filter
    /// applies no restriction. Results arrive in descending score order.
    async fn search(
        &self,
        index: &str,
        query_text: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<ResultCursor>;

    /// Upsert a batch of documents by key.
    async fn upload_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
    ) -> Result<Vec<BatchItemResult>>;

    /// Delete a batch of documents by key.
    async fn delete_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
    ) -> Result<Vec<BatchItemResult>>;
}

/// Supplies the opaque hashed id of the caller on whose behalf documents are
/// ingested.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_hashed_id(&self) -> Result<String>;
}

/// An identity fixed at construction, e.g. resolved once by the host.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn user_hashed_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
