//! Batched ingest of content chunks into one owner scope.

use chrono::{DateTime, Utc};
use docindex_core::schema::{
    CONTENT_TYPE_FIELD, LAST_MODIFIED_FIELD, ORIGIN_NAME_FIELD, PATH_FIELD, SIZE_FIELD, USER_FIELD,
};
use docindex_core::types::Metadata;
use docindex_core::{FieldValue, IndexSchema, IndexedDocument, OperationOutcome, Result, SearchBackend};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::batch::correlate;
use crate::DocumentIndex;

/// Per-batch values shared by every chunk.
struct Stamp<'a> {
    origin_name: &'a str,
    scope_id: &'a str,
    user: Option<String>,
    ingested_at: DateTime<Utc>,
}

fn put(schema: &IndexSchema, metadata: &mut Metadata, field: &str, value: impl Into<FieldValue>) {
    let owned = [&schema.key_field, &schema.content_field, &schema.scope_field];
    if schema.has_field(field) && !owned.iter().any(|f| f.as_str() == field) {
        metadata.insert(field.to_string(), value.into());
    }
}

fn build_document(schema: &IndexSchema, stamp: &Stamp<'_>, content: &str) -> IndexedDocument {
    let mut metadata = Metadata::new();
    let size = i64::try_from(content.len()).unwrap_or(i64::MAX);
    put(schema, &mut metadata, SIZE_FIELD, size);
    put(schema, &mut metadata, LAST_MODIFIED_FIELD, stamp.ingested_at);
    put(schema, &mut metadata, ORIGIN_NAME_FIELD, stamp.origin_name);
    put(schema, &mut metadata, PATH_FIELD, "");
    put(schema, &mut metadata, CONTENT_TYPE_FIELD, "");
    if let Some(user) = &stamp.user {
        put(schema, &mut metadata, USER_FIELD, user.as_str());
    }
    IndexedDocument {
        id: Uuid::new_v4().to_string(),
        content: content.to_string(),
        owner_scope: stamp.scope_id.to_string(),
        metadata,
    }
}

impl<B: SearchBackend> DocumentIndex<B> {
    async fn caller_id(&self) -> Result<Option<String>> {
        if !self.schema.has_field(USER_FIELD) {
            return Ok(None);
        }
        match &self.identity {
            Some(identity) => identity.user_hashed_id().await.map(Some),
            None => Ok(None),
        }
    }

    /// Build one document per chunk and upload them in a single batch.
    ///
    /// Returns one outcome per chunk, in input order. A failure before the
    /// batch is issued (provisioning, identity, transport) yields a single
    /// `ERROR` outcome instead.
    pub async fn index_documents<S: AsRef<str>>(
        &self,
        origin_name: &str,
        scope_id: &str,
        chunks: &[S],
    ) -> Vec<OperationOutcome<bool>> {
        if chunks.is_empty() {
            return Vec::new();
        }
        match self.upload(origin_name, scope_id, chunks).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(index = %self.schema.name, scope = scope_id, error = %err, "ingest failed before upload");
                vec![OperationOutcome::from_error(&err)]
            }
        }
    }

    async fn upload<S: AsRef<str>>(
        &self,
        origin_name: &str,
        scope_id: &str,
        chunks: &[S],
    ) -> Result<Vec<OperationOutcome<bool>>> {
        self.provision().await?;
        let stamp = Stamp { origin_name, scope_id, user: self.caller_id().await?, ingested_at: Utc::now() };
        let documents: Vec<IndexedDocument> =
            chunks.iter().map(|c| build_document(&self.schema, &stamp, c.as_ref())).collect();
        debug!(index = %self.schema.name, scope = scope_id, origin = origin_name, count = documents.len(), "uploading batch");
        let results = self.backend.upload_documents(&self.schema.name, &documents).await?;
        Ok(correlate("upload", &documents, results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> Stamp<'static> {
        Stamp { origin_name: "notes.md", scope_id: "t1", user: Some("u-1".to_string()), ingested_at: Utc::now() }
    }

    #[test]
    fn conversation_documents_carry_user_and_origin() {
        let schema = IndexSchema::conversation("chat");
        let doc = build_document(&schema, &stamp(), "héllo");
        assert_eq!(doc.owner_scope, "t1");
        assert_eq!(doc.metadata.get(SIZE_FIELD), Some(&FieldValue::Int64(6)));
        assert_eq!(doc.metadata.get(USER_FIELD), Some(&FieldValue::from("u-1")));
        assert_eq!(doc.metadata.get(ORIGIN_NAME_FIELD), Some(&FieldValue::from("notes.md")));
        assert_eq!(doc.metadata.get(PATH_FIELD), Some(&FieldValue::from("")));
    }

    #[test]
    fn library_documents_skip_undeclared_and_scope_fields() {
        let schema = IndexSchema::library("lib");
        let doc = build_document(&schema, &stamp(), "x");
        assert!(!doc.metadata.contains_key(USER_FIELD));
        // the path is the scope there, carried by owner_scope
        assert!(!doc.metadata.contains_key(PATH_FIELD));
        assert_eq!(doc.value_of(&schema, PATH_FIELD), Some(FieldValue::from("t1")));
    }

    #[test]
    fn ids_are_unique_per_chunk() {
        let schema = IndexSchema::conversation("chat");
        let a = build_document(&schema, &stamp(), "same");
        let b = build_document(&schema, &stamp(), "same");
        assert_ne!(a.id, b.id);
    }
}
