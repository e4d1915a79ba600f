use std::collections::HashMap;

use tantivy::schema::{
	DateOptions, DateTimePrecision, Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions,
	STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::{Index, TantivyError};

use docindex_core::schema::{FieldSpec, FieldType, IndexSchema};
use docindex_core::IndexError;

pub const TOKENIZER: &str = "text_with_stopwords";
pub const EXACT_SUFFIX: &str = "_exact";

/// Searchable strings are tokenized, so filtering on them needs an untokenized twin.
pub(crate) fn needs_exact_twin(spec: &FieldSpec) -> bool {
	spec.field_type == FieldType::String && spec.searchable && !spec.key && (spec.filterable || spec.facetable)
}

pub fn exact_field_name(name: &str) -> String {
	format!("{name}{EXACT_SUFFIX}")
}

pub fn build_schema(index_schema: &IndexSchema) -> Schema {
	let mut schema_builder = Schema::builder();
	for spec in &index_schema.fields {
		let exact = spec.filterable || spec.facetable || spec.sortable;
		match spec.field_type {
			FieldType::String if spec.key => {
				schema_builder.add_text_field(&spec.name, STRING | STORED);
			}
			FieldType::String if spec.searchable => {
				let indexing = TextFieldIndexing::default()
					.set_tokenizer(TOKENIZER)
					.set_index_option(IndexRecordOption::WithFreqsAndPositions);
				schema_builder.add_text_field(&spec.name, TextOptions::default().set_indexing_options(indexing).set_stored());
				if needs_exact_twin(spec) {
					schema_builder.add_text_field(&exact_field_name(&spec.name), STRING);
				}
			}
			FieldType::String if exact => {
				schema_builder.add_text_field(&spec.name, STRING | STORED);
			}
			FieldType::String => {
				schema_builder.add_text_field(&spec.name, STORED);
			}
			FieldType::Int64 => {
				schema_builder.add_i64_field(&spec.name, numeric_options(exact));
			}
			FieldType::Double => {
				schema_builder.add_f64_field(&spec.name, numeric_options(exact));
			}
			FieldType::DateTimeOffset => {
				let options = DateOptions::default().set_stored();
				// the inverted index keeps seconds only; exact filters read the fast column
				let options = if exact {
					options.set_indexed().set_fast().set_precision(DateTimePrecision::Microseconds)
				} else {
					options
				};
				schema_builder.add_date_field(&spec.name, options);
			}
		}
	}
	schema_builder.build()
}

fn numeric_options(indexed: bool) -> NumericOptions {
	let options = NumericOptions::default().set_stored();
	if indexed { options.set_indexed().set_fast() } else { options }
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Tantivy field handles for every declared field, plus the exact-match twins.
#[derive(Debug, Clone)]
pub struct FieldMap {
	stored: HashMap<String, Field>,
	exact: HashMap<String, Field>,
}

impl FieldMap {
	pub fn resolve(index_schema: &IndexSchema, schema: &Schema) -> Result<Self, IndexError> {
		let mut stored = HashMap::new();
		let mut exact = HashMap::new();
		for spec in &index_schema.fields {
			stored.insert(spec.name.clone(), schema.get_field(&spec.name).map_err(tantivy_error)?);
			if needs_exact_twin(spec) {
				exact.insert(spec.name.clone(), schema.get_field(&exact_field_name(&spec.name)).map_err(tantivy_error)?);
			}
		}
		Ok(Self { stored, exact })
	}

	pub fn stored(&self, name: &str) -> Option<Field> {
		self.stored.get(name).copied()
	}

	/// The field to match filter terms against.
	pub fn filter_target(&self, name: &str) -> Option<Field> {
		self.exact.get(name).or_else(|| self.stored.get(name)).copied()
	}

	pub fn exact_twin(&self, name: &str) -> Option<Field> {
		self.exact.get(name).copied()
	}
}

pub fn tantivy_error(err: TantivyError) -> IndexError {
	match err {
		TantivyError::IndexAlreadyExists => IndexError::backend_with_code("index already exists", "IndexAlreadyExists"),
		TantivyError::LockFailure(..) => IndexError::backend_with_code(err.to_string(), "LockBusy"),
		other => IndexError::backend(other.to_string()),
	}
}
