use std::sync::Arc;

use tempfile::TempDir;

use docindex_core::schema::{LAST_MODIFIED_FIELD, SIZE_FIELD};
use docindex_core::{FieldValue, IndexSchema, StaticIdentity};
use docindex_service::DocumentIndex;
use docindex_text::TantivyBackend;

#[tokio::test]
async fn conversation_lifecycle_on_disk() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let backend = Arc::new(TantivyBackend::new(tmp.path()));
    let index = DocumentIndex::new(backend, IndexSchema::conversation("chat-documents"))
        .with_identity(Arc::new(StaticIdentity("hash-42".to_string())));

    let chunks = ["Boil water for one minute before drinking", "Überprüfung der Wasserfilter"];
    let outcomes = index.index_documents("notes.md", "thread-1", &chunks).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    index.index_documents("fire.md", "thread-2", &["Keep the campfire small"]).await;

    let everything = index.search(None, None).await.into_value().expect("match all");
    assert_eq!(everything.len(), 3);

    let scoped = index.search(Some("water"), Some("chatThreadId eq 'thread-1'")).await.into_value().expect("search");
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].document.content, chunks[0]);

    let thread: Vec<_> = index.search(None, Some("chatThreadId eq 'thread-1'")).await.into_value().expect("search");
    let german = thread.iter().find(|h| h.document.content.starts_with('Ü')).expect("multi-byte chunk");
    assert_eq!(german.document.metadata.get(SIZE_FIELD), Some(&FieldValue::Int64(i64::try_from(chunks[1].len())?)));
    assert!(matches!(german.document.metadata.get(LAST_MODIFIED_FIELD), Some(FieldValue::DateTime(_))));

    let deleted = index.delete_by_scope("thread-1").await;
    assert_eq!(deleted.len(), 2);
    let left = index.search(None, Some("chatThreadId eq 'thread-1'")).await.into_value().expect("search");
    assert!(left.is_empty());
    assert_eq!(index.search(None, None).await.into_value().expect("search").len(), 1);
    Ok(())
}

#[tokio::test]
async fn library_index_is_scoped_by_item_path() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let backend = Arc::new(TantivyBackend::new(tmp.path()));
    let index = DocumentIndex::new(backend, IndexSchema::library("library-documents"));

    assert!(index.ensure_index().await.is_ok());
    index.index_documents("guide.pdf", "/sites/field/guide.pdf", &["first aid", "splints"]).await;
    index.index_documents("map.pdf", "/sites/field/map.pdf", &["trail map"]).await;

    let hits = index
        .search(None, Some("metadata_spo_item_path eq '/sites/field/guide.pdf'"))
        .await
        .into_value()
        .expect("search");
    assert_eq!(hits.len(), 2);

    let map = index.search(None, Some("ownerScope eq '/sites/field/map.pdf'")).await.into_value().expect("search");
    assert_eq!(map.len(), 1);
    let Some(FieldValue::DateTime(modified)) = map[0].document.metadata.get(LAST_MODIFIED_FIELD).cloned() else {
        panic!("last modified is not a timestamp");
    };
    let same_stamp = format!("{LAST_MODIFIED_FIELD} eq '{}'", modified.to_rfc3339());
    let stamped = index.search(None, Some(&same_stamp)).await.into_value().expect("search");
    assert!(stamped.iter().any(|h| h.document.id == map[0].document.id));

    assert_eq!(index.delete_by_scope("/sites/field/guide.pdf").await.len(), 2);
    assert_eq!(index.search(None, None).await.into_value().expect("search").len(), 1);
    Ok(())
}
