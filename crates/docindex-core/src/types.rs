//! Domain types shared by the backends and the lifecycle service.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::schema::IndexSchema;

pub type DocumentId = String;
pub type Metadata = BTreeMap<String, FieldValue>;

/// A single typed field value. Variants mirror [`crate::schema::FieldType`].
///
/// Serialize only: read back untagged, an RFC 3339 string would come back as
/// a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int64(i64),
    Double(f64),
    DateTime(DateTime<Utc>),
    String(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

/// One indexable unit.
///
/// - `id`: generated at ingest time, immutable, stored under the schema's key field
/// - `content`: the searchable text payload
/// - `owner_scope`: the conversation/user/path the document belongs to, stored
///   under the schema's scope field
/// - `metadata`: every other schema field, keyed by field name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub content: String,
    pub owner_scope: String,
    pub metadata: Metadata,
}

impl IndexedDocument {
    /// Resolve a schema field name to this document's value for it.
    pub fn value_of(&self, schema: &IndexSchema, field: &str) -> Option<FieldValue> {
        if field == schema.key_field {
            Some(FieldValue::String(self.id.clone()))
        } else if field == schema.scope_field {
            Some(FieldValue::String(self.owner_scope.clone()))
        } else if field == schema.content_field {
            Some(FieldValue::String(self.content.clone()))
        } else {
            self.metadata.get(field).cloned()
        }
    }
}

/// A matched document paired with its backend relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub score: f32,
    pub document: IndexedDocument,
}

/// Per-document result of a batched upload or delete, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub key: DocumentId,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl BatchItemResult {
    pub fn ok(key: impl Into<String>) -> Self {
        Self { key: key.into(), succeeded: true, error_message: None, status_code: Some(200) }
    }

    pub fn failed(key: impl Into<String>, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            key: key.into(),
            succeeded: false,
            error_message: Some(message.into()),
            status_code: Some(status_code),
        }
    }
}

/// Value/count pair produced by facet counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&IndexError> for OutcomeError {
    fn from(err: &IndexError) -> Self {
        Self { message: err.to_string(), code: err.code().map(str::to_string) }
    }
}

/// The uniform result of every externally observable operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "response", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationOutcome<T> {
    Ok(T),
    Error(Vec<OutcomeError>),
}

impl<T> OperationOutcome<T> {
    pub fn from_error(err: &IndexError) -> Self {
        Self::Error(vec![OutcomeError::from(err)])
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    pub fn errors(&self) -> &[OutcomeError] {
        match self {
            Self::Ok(_) => &[],
            Self::Error(errors) => errors,
        }
    }
}

impl<T> From<crate::error::Result<T>> for OperationOutcome<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::from_error(&e),
        }
    }
}
