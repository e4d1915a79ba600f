use std::ops::Bound;

use chrono::DateTime;
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use docindex_core::filter::{CompareOp, Literal};
use docindex_core::schema::{FieldType, IndexSchema};
use docindex_core::traits::ResultCursor;
use docindex_core::{FieldValue, Filter, IndexError, IndexedDocument, Result, SearchResult};

use crate::index::{to_tantivy_date, OpenIndex};
use crate::tantivy_utils::{tantivy_error, FieldMap};

fn is_match_all(text: &str) -> bool {
	let text = text.trim();
	text.is_empty() || text == "*"
}

fn text_query(open: &OpenIndex, query_text: Option<&str>) -> Result<Box<dyn Query>> {
	let text = match query_text {
		Some(text) if !is_match_all(text) => text,
		_ => return Ok(Box::new(AllQuery)),
	};
	let fields: Vec<_> = open.schema.searchable_fields().filter_map(|f| open.fields.stored(&f.name)).collect();
	if fields.is_empty() {
		return Err(IndexError::backend(format!("index '{}' has no searchable fields", open.schema.name)));
	}
	let parser = QueryParser::for_index(&open.index, fields);
	let (query, errors) = parser.parse_query_lenient(text);
	if !errors.is_empty() {
		debug!(query = text, errors = errors.len(), "lenient query parse dropped clauses");
	}
	Ok(query)
}

fn invalid(field: &str, value: &Literal) -> IndexError {
	IndexError::InvalidFilter(format!("cannot compare field '{field}' with {value}"))
}

/// Exact comparison query for one field. Dates go through an inclusive range
/// so the microsecond fast column is used instead of the second-precision terms.
fn compare_query(schema: &IndexSchema, fields: &FieldMap, field: &str, value: &Literal) -> Result<Box<dyn Query>> {
	let name = schema.resolve_field(field);
	let spec = schema
		.field(name)
		.filter(|s| s.filterable || s.key)
		.ok_or_else(|| IndexError::InvalidFilter(format!("field '{field}' is not filterable")))?;
	let target = fields.filter_target(name).ok_or_else(|| invalid(field, value))?;
	#[allow(clippy::cast_precision_loss)]
	let term = match (spec.field_type, value) {
		(FieldType::String, Literal::String(s)) => Term::from_field_text(target, s),
		(FieldType::Int64, Literal::Int64(v)) => Term::from_field_i64(target, *v),
		(FieldType::Double, Literal::Double(v)) => Term::from_field_f64(target, *v),
		(FieldType::Double, Literal::Int64(v)) => Term::from_field_f64(target, *v as f64),
		(FieldType::DateTimeOffset, Literal::String(s)) => {
			let dt = DateTime::parse_from_rfc3339(s).map_err(|_| invalid(field, value))?;
			let term = Term::from_field_date(target, to_tantivy_date(dt.with_timezone(&chrono::Utc)));
			return Ok(Box::new(RangeQuery::new(Bound::Included(term.clone()), Bound::Included(term))));
		}
		_ => return Err(invalid(field, value)),
	};
	Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
}

fn everything_but(query: Box<dyn Query>) -> Box<dyn Query> {
	Box::new(BooleanQuery::new(vec![(Occur::Must, Box::new(AllQuery) as Box<dyn Query>), (Occur::MustNot, query)]))
}

pub(crate) fn filter_query(schema: &IndexSchema, fields: &FieldMap, filter: &Filter) -> Result<Box<dyn Query>> {
	Ok(match filter {
		Filter::Compare { field, op, value } => {
			let compare = compare_query(schema, fields, field, value)?;
			match op {
				CompareOp::Eq => compare,
				CompareOp::Ne => everything_but(compare),
			}
		}
		Filter::And(a, b) => Box::new(BooleanQuery::new(vec![
			(Occur::Must, filter_query(schema, fields, a)?),
			(Occur::Must, filter_query(schema, fields, b)?),
		])),
		Filter::Or(a, b) => Box::new(BooleanQuery::new(vec![
			(Occur::Should, filter_query(schema, fields, a)?),
			(Occur::Should, filter_query(schema, fields, b)?),
		])),
		Filter::Not(inner) => everything_but(filter_query(schema, fields, inner)?),
	})
}

fn from_tantivy(doc: &TantivyDocument, schema: &IndexSchema, fields: &FieldMap) -> Result<IndexedDocument> {
	let mut out = IndexedDocument {
		id: String::new(),
		content: String::new(),
		owner_scope: String::new(),
		metadata: Default::default(),
	};
	for spec in &schema.fields {
		let Some(field) = fields.stored(&spec.name) else { continue };
		let Some(raw) = doc.get_first(field) else { continue };
		let value = match spec.field_type {
			FieldType::String => raw.as_str().map(|s| FieldValue::String(s.to_string())),
			FieldType::Int64 => raw.as_i64().map(FieldValue::Int64),
			FieldType::Double => raw.as_f64().map(FieldValue::Double),
			FieldType::DateTimeOffset => raw
				.as_datetime()
				.and_then(|d| DateTime::from_timestamp_micros(d.into_timestamp_micros()))
				.map(FieldValue::DateTime),
		};
		let Some(value) = value else { continue };
		match value {
			FieldValue::String(s) if spec.name == schema.key_field => out.id = s,
			FieldValue::String(s) if spec.name == schema.scope_field => out.owner_scope = s,
			FieldValue::String(s) if spec.name == schema.content_field => out.content = s,
			other => {
				out.metadata.insert(spec.name.clone(), other);
			}
		}
	}
	if out.id.is_empty() {
		return Err(IndexError::backend(format!("stored document in '{}' has no key", schema.name)));
	}
	Ok(out)
}

/// Run the query and load every matching stored document. Called from a
/// blocking task; the returned cursor does no further I/O.
pub(crate) fn execute(open: OpenIndex, query_text: Option<&str>, filter: Option<&Filter>) -> Result<ResultCursor> {
	let text = text_query(&open, query_text)?;
	let query: Box<dyn Query> = match filter {
		Some(filter) => {
			let restriction = filter_query(&open.schema, &open.fields, filter)?;
			Box::new(BooleanQuery::new(vec![
				(Occur::Must, text),
				(Occur::Must, Box::new(ConstScoreQuery::new(restriction, 0.0)) as Box<dyn Query>),
			]))
		}
		None => text,
	};

	let reader = open
		.index
		.reader_builder()
		.reload_policy(ReloadPolicy::Manual)
		.try_into()
		.map_err(tantivy_error)?;
	let searcher = reader.searcher();
	let limit = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1);
	let top_docs = searcher.search(&query, &TopDocs::with_limit(limit)).map_err(tantivy_error)?;
	debug!(index = %open.schema.name, hits = top_docs.len(), "tantivy search");

	// a failed load stays in place so the caller sees it while draining
	let loaded: Vec<Result<SearchResult>> = top_docs
		.into_iter()
		.map(|(score, address)| -> Result<SearchResult> {
			let doc: TantivyDocument = searcher.doc(address).map_err(tantivy_error)?;
			let document = from_tantivy(&doc, &open.schema, &open.fields)?;
			Ok(SearchResult { score, document })
		})
		.collect();
	Ok(Box::pin(futures::stream::iter(loaded)))
}
