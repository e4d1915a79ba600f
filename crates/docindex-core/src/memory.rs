//! In-process backend holding every index in memory.
//!
//! [`MemoryBackend`] keeps a `HashMap` of index name to schema plus documents in
//! insertion order, guarded by a `tokio::sync::RwLock`. It is suitable for
//! development, tests and hosts that need no persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::filter::Filter;
use crate::schema::IndexSchema;
use crate::traits::{ResultCursor, SearchBackend};
use crate::types::{BatchItemResult, IndexedDocument, SearchResult};

#[derive(Debug)]
struct MemoryIndex {
    schema: IndexSchema,
    documents: Vec<IndexedDocument>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored under `index`, or `None` if it does not exist.
    pub async fn document_count(&self, index: &str) -> Option<usize> {
        self.indexes.read().await.get(index).map(|i| i.documents.len())
    }
}

fn lowercase_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect()
}

/// Fraction of query terms found in the document's searchable fields.
#[allow(clippy::cast_precision_loss)]
fn term_score(doc: &IndexedDocument, schema: &IndexSchema, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let mut haystack = Vec::new();
    for field in schema.searchable_fields() {
        if let Some(value) = doc.value_of(schema, &field.name) {
            haystack.extend(lowercase_terms(&value.to_string()));
        }
    }
    let hits = terms.iter().filter(|t| haystack.contains(t)).count();
    hits as f32 / terms.len() as f32
}

fn is_match_all(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == "*"
}

fn missing_index(name: &str) -> IndexError {
    IndexError::NotFound(name.to_string())
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn get_index(&self, name: &str) -> Result<IndexSchema> {
        let indexes = self.indexes.read().await;
        indexes.get(name).map(|i| i.schema.clone()).ok_or_else(|| missing_index(name))
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<IndexSchema> {
        schema.validate()?;
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(&schema.name) {
            return Err(IndexError::AlreadyExists(schema.name.clone()));
        }
        indexes.insert(schema.name.clone(), MemoryIndex { schema: schema.clone(), documents: Vec::new() });
        debug!(index = %schema.name, "created in-memory index");
        Ok(schema.clone())
    }

    async fn search(
        &self,
        index: &str,
        query_text: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<ResultCursor> {
        let indexes = self.indexes.read().await;
        let stored = indexes.get(index).ok_or_else(|| missing_index(index))?;
        // punctuation-only text has no terms and so matches nothing
        let terms = query_text.filter(|t| !is_match_all(t)).map(lowercase_terms);

        let mut results: Vec<SearchResult> = stored
            .documents
            .iter()
            .filter(|doc| filter.map_or(true, |f| f.matches(doc, &stored.schema)))
            .filter_map(|doc| {
                let score = terms.as_ref().map_or(1.0, |t| term_score(doc, &stored.schema, t));
                (score > 0.0).then(|| SearchResult { score, document: doc.clone() })
            })
            .collect();

        // stable: equal scores keep insertion order
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Box::pin(futures::stream::iter(results.into_iter().map(Ok))))
    }

    async fn upload_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
    ) -> Result<Vec<BatchItemResult>> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(index).ok_or_else(|| missing_index(index))?;
        let mut results = Vec::with_capacity(documents.len());
        for doc in documents {
            if doc.id.is_empty() {
                results.push(BatchItemResult::failed("", "document key must not be empty", 400));
                continue;
            }
            match stored.documents.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc.clone(),
                None => stored.documents.push(doc.clone()),
            }
            results.push(BatchItemResult::ok(doc.id.clone()));
        }
        Ok(results)
    }

    async fn delete_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
    ) -> Result<Vec<BatchItemResult>> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(index).ok_or_else(|| missing_index(index))?;
        let mut results = Vec::with_capacity(documents.len());
        for doc in documents {
            stored.documents.retain(|d| d.id != doc.id);
            results.push(BatchItemResult::ok(doc.id.clone()));
        }
        Ok(results)
    }
}
