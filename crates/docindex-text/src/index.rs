use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tantivy::{Index, IndexWriter, TantivyDocument, Term};
use tracing::{debug, info};

use docindex_core::schema::{FieldType, IndexSchema};
use docindex_core::traits::{ResultCursor, SearchBackend};
use docindex_core::{BatchItemResult, Filter, FieldValue, IndexError, IndexedDocument, Result};

use crate::tantivy_utils::{build_schema, register_tokenizer, tantivy_error, FieldMap};

const WRITER_HEAP_BYTES: usize = 50_000_000;
const DESCRIPTOR_FILE: &str = "descriptor.json";

/// An index opened from disk together with its declared schema.
pub(crate) struct OpenIndex {
	pub(crate) index: Index,
	pub(crate) schema: IndexSchema,
	pub(crate) fields: FieldMap,
}

/// On-disk backend: `root/<index name>/` holds a tantivy index and the
/// `descriptor.json` the index was created from.
#[derive(Debug, Clone)]
pub struct TantivyBackend {
	root: PathBuf,
	writer_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TantivyBackend {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into(), writer_locks: Arc::default() }
	}

	fn index_dir(&self, name: &str) -> Result<PathBuf> {
		let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
		if !valid {
			return Err(IndexError::InvalidConfig(format!("invalid index name '{name}'")));
		}
		Ok(self.root.join(name))
	}

	/// One in-process writer per index at a time; tantivy's own lock would
	/// otherwise reject the second writer outright.
	fn writer_lock(&self, name: &str) -> Arc<Mutex<()>> {
		let mut locks = self.writer_locks.lock().unwrap_or_else(PoisonError::into_inner);
		Arc::clone(locks.entry(name.to_string()).or_default())
	}
}

pub(crate) async fn blocking<T, F>(task: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> Result<T> + Send + 'static,
{
	tokio::task::spawn_blocking(task)
		.await
		.map_err(|e| IndexError::backend(format!("tantivy task failed: {e}")))?
}

fn io_error(context: &str, err: impl std::fmt::Display) -> IndexError {
	IndexError::backend(format!("{context}: {err}"))
}

pub(crate) fn open_index(dir: &Path, name: &str) -> Result<OpenIndex> {
	if !dir.join("meta.json").exists() {
		return Err(IndexError::NotFound(name.to_string()));
	}
	let raw = fs::read_to_string(dir.join(DESCRIPTOR_FILE)).map_err(|e| io_error("reading index descriptor", e))?;
	let schema: IndexSchema =
		serde_json::from_str(&raw).map_err(|e| io_error("parsing index descriptor", e))?;
	let index = Index::open_in_dir(dir).map_err(tantivy_error)?;
	register_tokenizer(&index);
	let fields = FieldMap::resolve(&schema, &index.schema())?;
	Ok(OpenIndex { index, schema, fields })
}

fn create_index_dir(dir: &Path, schema: &IndexSchema) -> Result<()> {
	if dir.join("meta.json").exists() {
		return Err(IndexError::AlreadyExists(schema.name.clone()));
	}
	fs::create_dir_all(dir).map_err(|e| io_error("creating index directory", e))?;
	let descriptor = serde_json::to_string_pretty(schema).map_err(|e| io_error("encoding index descriptor", e))?;
	let tmp = dir.join(format!("{DESCRIPTOR_FILE}.tmp"));
	fs::write(&tmp, descriptor).map_err(|e| io_error("writing index descriptor", e))?;
	fs::rename(&tmp, dir.join(DESCRIPTOR_FILE)).map_err(|e| io_error("writing index descriptor", e))?;
	match Index::create_in_dir(dir, build_schema(schema)) {
		Ok(index) => {
			register_tokenizer(&index);
			Ok(())
		}
		Err(tantivy::TantivyError::IndexAlreadyExists) => Err(IndexError::AlreadyExists(schema.name.clone())),
		Err(e) => Err(tantivy_error(e)),
	}
}

fn to_tantivy(doc: &IndexedDocument, open: &OpenIndex) -> std::result::Result<TantivyDocument, String> {
	let schema = &open.schema;
	if doc.id.is_empty() {
		return Err("document key must not be empty".to_string());
	}
	if let Some(unknown) = doc.metadata.keys().find(|k| !schema.has_field(k)) {
		return Err(format!("field '{unknown}' is not declared by index '{}'", schema.name));
	}
	let mut out = TantivyDocument::default();
	for spec in &schema.fields {
		let Some(value) = doc.value_of(schema, &spec.name) else { continue };
		let field = open.fields.stored(&spec.name).ok_or_else(|| format!("field '{}' is not mapped", spec.name))?;
		match (spec.field_type, value) {
			(FieldType::String, FieldValue::String(s)) => {
				if let Some(exact) = open.fields.exact_twin(&spec.name) {
					out.add_text(exact, &s);
				}
				out.add_text(field, s);
			}
			(FieldType::Int64, FieldValue::Int64(v)) => out.add_i64(field, v),
			(FieldType::Double, FieldValue::Double(v)) => out.add_f64(field, v),
			#[allow(clippy::cast_precision_loss)]
			(FieldType::Double, FieldValue::Int64(v)) => out.add_f64(field, v as f64),
			(FieldType::DateTimeOffset, FieldValue::DateTime(dt)) => out.add_date(field, to_tantivy_date(dt)),
			(FieldType::DateTimeOffset, FieldValue::String(s)) => {
				let dt = DateTime::parse_from_rfc3339(&s)
					.map_err(|e| format!("field '{}' is not an RFC 3339 timestamp: {e}", spec.name))?;
				out.add_date(field, to_tantivy_date(dt.with_timezone(&Utc)));
			}
			(expected, value) => {
				return Err(format!("field '{}' expects {expected:?}, got '{value}'", spec.name));
			}
		}
	}
	Ok(out)
}

pub(crate) fn to_tantivy_date(dt: DateTime<Utc>) -> tantivy::DateTime {
	tantivy::DateTime::from_timestamp_micros(dt.timestamp_micros())
}

#[async_trait]
impl SearchBackend for TantivyBackend {
	async fn get_index(&self, name: &str) -> Result<IndexSchema> {
		let dir = self.index_dir(name)?;
		let name = name.to_string();
		blocking(move || open_index(&dir, &name).map(|open| open.schema)).await
	}

	async fn create_index(&self, schema: &IndexSchema) -> Result<IndexSchema> {
		schema.validate()?;
		let dir = self.index_dir(&schema.name)?;
		let schema = schema.clone();
		blocking(move || {
			create_index_dir(&dir, &schema)?;
			info!(index = %schema.name, dir = %dir.display(), "created tantivy index");
			Ok(schema)
		})
		.await
	}

	async fn search(&self, index: &str, query_text: Option<&str>, filter: Option<&Filter>) -> Result<ResultCursor> {
		let dir = self.index_dir(index)?;
		let name = index.to_string();
		let query_text = query_text.map(str::to_string);
		let filter = filter.cloned();
		blocking(move || {
			let open = open_index(&dir, &name)?;
			crate::search::execute(open, query_text.as_deref(), filter.as_ref())
		})
		.await
	}

	async fn upload_documents(&self, index: &str, documents: &[IndexedDocument]) -> Result<Vec<BatchItemResult>> {
		let dir = self.index_dir(index)?;
		let name = index.to_string();
		let documents = documents.to_vec();
		let lock = self.writer_lock(index);
		blocking(move || {
			let open = open_index(&dir, &name)?;
			let key_field = open.fields.stored(&open.schema.key_field).ok_or_else(|| IndexError::backend("key field is not mapped"))?;
			let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
			let mut writer: IndexWriter<TantivyDocument> = open.index.writer(WRITER_HEAP_BYTES).map_err(tantivy_error)?;
			let mut results = Vec::with_capacity(documents.len());
			for doc in &documents {
				match to_tantivy(doc, &open) {
					Ok(converted) => {
						writer.delete_term(Term::from_field_text(key_field, &doc.id));
						writer.add_document(converted).map_err(tantivy_error)?;
						results.push(BatchItemResult::ok(doc.id.clone()));
					}
					Err(message) => results.push(BatchItemResult::failed(doc.id.clone(), message, 400)),
				}
			}
			writer.commit().map_err(tantivy_error)?;
			debug!(index = %name, submitted = documents.len(), "committed upload batch");
			Ok(results)
		})
		.await
	}

	async fn delete_documents(&self, index: &str, documents: &[IndexedDocument]) -> Result<Vec<BatchItemResult>> {
		let dir = self.index_dir(index)?;
		let name = index.to_string();
		let keys: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
		let lock = self.writer_lock(index);
		blocking(move || {
			let open = open_index(&dir, &name)?;
			let key_field = open.fields.stored(&open.schema.key_field).ok_or_else(|| IndexError::backend("key field is not mapped"))?;
			let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
			let mut writer: IndexWriter<TantivyDocument> = open.index.writer(WRITER_HEAP_BYTES).map_err(tantivy_error)?;
			for key in &keys {
				writer.delete_term(Term::from_field_text(key_field, key));
			}
			writer.commit().map_err(tantivy_error)?;
			debug!(index = %name, deleted = keys.len(), "committed delete batch");
			Ok(keys.into_iter().map(BatchItemResult::ok).collect())
		})
		.await
	}
}
