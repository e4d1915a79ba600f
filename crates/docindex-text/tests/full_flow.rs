use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use tempfile::TempDir;

use docindex_core::schema::{CONTENT_TYPE_FIELD, LAST_MODIFIED_FIELD, ORIGIN_NAME_FIELD, SIZE_FIELD, USER_FIELD};
use docindex_core::{
    FieldValue, Filter, IndexError, IndexSchema, IndexedDocument, SearchBackend, SearchResult,
};
use docindex_text::TantivyBackend;

fn doc(id: &str, thread: &str, content: &str) -> IndexedDocument {
    let mut d = IndexedDocument {
        id: id.to_string(),
        content: content.to_string(),
        owner_scope: thread.to_string(),
        metadata: Default::default(),
    };
    d.metadata.insert(USER_FIELD.to_string(), "user-hash".into());
    d.metadata.insert(ORIGIN_NAME_FIELD.to_string(), "notes.txt".into());
    d.metadata.insert(CONTENT_TYPE_FIELD.to_string(), "text/plain".into());
    d.metadata.insert(LAST_MODIFIED_FIELD.to_string(), Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap().into());
    d.metadata.insert(SIZE_FIELD.to_string(), i64::try_from(content.len()).unwrap().into());
    d
}

async fn search(backend: &TantivyBackend, query: Option<&str>, filter: Option<&str>) -> Vec<SearchResult> {
    let filter = filter.map(|f| Filter::parse(f).expect("filter"));
    backend
        .search("chat", query, filter.as_ref())
        .await
        .expect("search")
        .try_collect()
        .await
        .expect("drain")
}

async fn backend_with_index() -> (TempDir, TantivyBackend) {
    let tmp = TempDir::new().expect("tmp");
    let backend = TantivyBackend::new(tmp.path());
    backend.create_index(&IndexSchema::conversation("chat")).await.expect("create");
    (tmp, backend)
}

#[tokio::test]
async fn provisioning_persists_descriptor() {
    let tmp = TempDir::new().expect("tmp");
    let backend = TantivyBackend::new(tmp.path());
    assert!(backend.get_index("chat").await.expect_err("absent").is_not_found());

    let schema = IndexSchema::conversation("chat");
    backend.create_index(&schema).await.expect("create");
    assert_eq!(backend.get_index("chat").await.expect("fetch"), schema);

    // a second handle on the same root sees the same index
    let reopened = TantivyBackend::new(tmp.path());
    assert_eq!(reopened.get_index("chat").await.expect("fetch"), schema);
    assert!(matches!(reopened.create_index(&schema).await, Err(IndexError::AlreadyExists(_))));
}

#[tokio::test]
async fn invalid_index_names_are_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let backend = TantivyBackend::new(tmp.path());
    assert!(matches!(backend.get_index("../escape").await, Err(IndexError::InvalidConfig(_))));
}

#[tokio::test]
async fn upload_search_and_delete_round_trip() {
    let (_tmp, backend) = backend_with_index().await;
    let docs = vec![
        doc("a", "t1", "campfire safety basics"),
        doc("b", "t1", "water purification"),
        doc("c", "t2", "campfire cooking"),
    ];
    let results = backend.upload_documents("chat", &docs).await.expect("upload");
    assert_eq!(results.iter().filter(|r| r.succeeded).count(), 3);

    let all = search(&backend, None, None).await;
    assert_eq!(all.len(), 3);

    let scoped = search(&backend, None, Some("chatThreadId eq 't1'")).await;
    let mut ids: Vec<_> = scoped.iter().map(|r| r.document.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(scoped.iter().all(|r| r.document.owner_scope == "t1"));

    let text = search(&backend, Some("campfire"), Some("chatThreadId eq 't2'")).await;
    assert_eq!(text.len(), 1);
    assert_eq!(text[0].document.id, "c");
    assert!(text[0].score > 0.0);

    let negated = search(&backend, None, Some("not chatThreadId eq 't1'")).await;
    assert_eq!(negated.len(), 1);

    let stored = &scoped[0].document;
    assert_eq!(stored.metadata.get(SIZE_FIELD).and_then(|v| v.as_i64()), Some(i64::try_from(stored.content.len()).unwrap()));
    assert!(stored.metadata.contains_key(LAST_MODIFIED_FIELD));

    backend.delete_documents("chat", &scoped.iter().map(|r| r.document.clone()).collect::<Vec<_>>()).await.expect("delete");
    assert!(search(&backend, None, Some("chatThreadId eq 't1'")).await.is_empty());
    assert_eq!(search(&backend, None, None).await.len(), 1);
}

#[tokio::test]
async fn upload_replaces_documents_with_the_same_key() {
    let (_tmp, backend) = backend_with_index().await;
    backend.upload_documents("chat", &[doc("a", "t1", "first version")]).await.expect("upload");
    backend.upload_documents("chat", &[doc("a", "t1", "second version")]).await.expect("upload");
    let all = search(&backend, None, None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].document.content, "second version");
}

#[tokio::test]
async fn bad_documents_fail_individually() {
    let (_tmp, backend) = backend_with_index().await;
    let mut wrong_type = doc("b", "t1", "typed wrong");
    wrong_type.metadata.insert(SIZE_FIELD.to_string(), "large".into());
    let mut unknown = doc("c", "t1", "unknown field");
    unknown.metadata.insert("colour".to_string(), "red".into());

    let results = backend
        .upload_documents("chat", &[doc("a", "t1", "fine"), wrong_type, unknown])
        .await
        .expect("upload");
    let outcome: Vec<_> = results.iter().map(|r| (r.key.as_str(), r.succeeded)).collect();
    assert_eq!(outcome, vec![("a", true), ("b", false), ("c", false)]);
    assert!(results[1].error_message.as_deref().is_some_and(|m| m.contains(SIZE_FIELD)));
    assert_eq!(search(&backend, None, None).await.len(), 1);
}

#[tokio::test]
async fn filters_on_tokenized_fields_match_exact_values() {
    let (_tmp, backend) = backend_with_index().await;
    backend.upload_documents("chat", &[doc("a", "thread one", "x"), doc("b", "thread", "y")]).await.expect("upload");
    let hits = search(&backend, None, Some("chatThreadId eq 'thread'")).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "b");
}

#[tokio::test]
async fn operations_on_a_missing_index_report_not_found() {
    let tmp = TempDir::new().expect("tmp");
    let backend = TantivyBackend::new(tmp.path());
    let err = backend.upload_documents("chat", &[doc("a", "t1", "x")]).await.expect_err("no index");
    assert!(err.is_not_found());
    assert!(backend.search("chat", None, None).await.is_err());
}

fn library_doc(id: &str, path: &str, modified: chrono::DateTime<Utc>) -> IndexedDocument {
    let mut d = IndexedDocument {
        id: id.to_string(),
        content: format!("library item {id}"),
        owner_scope: path.to_string(),
        metadata: Default::default(),
    };
    d.metadata.insert(LAST_MODIFIED_FIELD.to_string(), modified.into());
    d.metadata.insert(SIZE_FIELD.to_string(), 10_i64.into());
    d
}

#[tokio::test]
async fn date_filters_match_to_the_microsecond() {
    let tmp = TempDir::new().expect("tmp");
    let backend = TantivyBackend::new(tmp.path());
    backend.create_index(&IndexSchema::library("lib")).await.expect("create");

    let second = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let first = second + chrono::Duration::microseconds(123_456);
    let later = second + chrono::Duration::microseconds(654_321);
    backend
        .upload_documents("lib", &[library_doc("a", "/x/a.pdf", first), library_doc("b", "/x/b.pdf", later)])
        .await
        .expect("upload");

    let run = |expr: String| {
        let backend = backend.clone();
        async move {
            let filter = Filter::parse(&expr).expect("filter");
            let hits: Vec<SearchResult> =
                backend.search("lib", None, Some(&filter)).await.expect("search").try_collect().await.expect("drain");
            hits.into_iter().map(|h| h.document).collect::<Vec<_>>()
        }
    };

    let stored = run(format!("{LAST_MODIFIED_FIELD} eq '{}'", first.to_rfc3339())).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "a");
    assert_eq!(stored[0].metadata.get(LAST_MODIFIED_FIELD), Some(&FieldValue::DateTime(first)));

    // read the value back and filter on exactly what was stored
    let Some(FieldValue::DateTime(read_back)) = stored[0].metadata.get(LAST_MODIFIED_FIELD).cloned() else {
        panic!("last modified is not a timestamp");
    };
    assert_eq!(run(format!("{LAST_MODIFIED_FIELD} eq '{}'", read_back.to_rfc3339())).await.len(), 1);

    let others = run(format!("{LAST_MODIFIED_FIELD} ne '{}'", first.to_rfc3339())).await;
    assert_eq!(others.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    assert!(run(format!("{LAST_MODIFIED_FIELD} eq '{}'", second.to_rfc3339())).await.is_empty());
}

#[tokio::test]
async fn owner_scope_filter_targets_the_scope_field() {
    let (_tmp, backend) = backend_with_index().await;
    backend.upload_documents("chat", &[doc("a", "t1", "x"), doc("b", "t2", "y")]).await.expect("upload");
    let hits = search(&backend, None, Some("ownerScope eq 't2'")).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "b");

    let lib_tmp = TempDir::new().expect("tmp");
    let lib = TantivyBackend::new(lib_tmp.path());
    lib.create_index(&IndexSchema::library("lib")).await.expect("create");
    lib.upload_documents("lib", &[library_doc("p", "/x/p.pdf", Utc::now())]).await.expect("upload");
    let filter = Filter::parse("ownerScope eq '/x/p.pdf'").expect("filter");
    let found: Vec<SearchResult> =
        lib.search("lib", None, Some(&filter)).await.expect("search").try_collect().await.expect("drain");
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn cursor_drains_after_the_index_files_are_gone() {
    let (tmp, backend) = backend_with_index().await;
    backend.upload_documents("chat", &[doc("a", "t1", "x"), doc("b", "t1", "y")]).await.expect("upload");
    let cursor = backend.search("chat", None, None).await.expect("search");

    // stored documents were loaded before the cursor was handed back
    std::fs::remove_dir_all(tmp.path()).expect("remove");
    let hits: Vec<SearchResult> = cursor.try_collect().await.expect("drain");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| !h.document.content.is_empty()));
}
