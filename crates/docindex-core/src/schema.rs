//! Index schema declarations and the name -> schema registry.
//!
//! A schema is created once per index name; changing capabilities means a new
//! index name; there is no in-place migration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

pub const ID_FIELD: &str = "id";
pub const CONTENT_FIELD: &str = "content";
pub const USER_FIELD: &str = "user";
pub const CHAT_THREAD_FIELD: &str = "chatThreadId";
pub const ORIGIN_NAME_FIELD: &str = "metadata_spo_item_name";
pub const PATH_FIELD: &str = "metadata_spo_item_path";
pub const CONTENT_TYPE_FIELD: &str = "metadata_spo_item_content_type";
pub const LAST_MODIFIED_FIELD: &str = "metadata_spo_item_last_modified";
pub const SIZE_FIELD: &str = "metadata_spo_item_size";
/// Filter name for the owner scope, whatever field a schema stores it under.
pub const OWNER_SCOPE_ALIAS: &str = "ownerScope";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "Edm.String")]
    String,
    #[serde(rename = "Edm.Int64")]
    Int64,
    #[serde(rename = "Edm.Double")]
    Double,
    #[serde(rename = "Edm.DateTimeOffset")]
    DateTimeOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub facetable: bool,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            key: false,
            searchable: false,
            filterable: false,
            sortable: false,
            facetable: false,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn facetable(mut self) -> Self {
        self.facetable = true;
        self
    }
}

/// Ordered field list plus the names of the fields that carry the document
/// key, the text payload and the owner scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    pub name: String,
    pub key_field: String,
    pub content_field: String,
    pub scope_field: String,
    pub fields: Vec<FieldSpec>,
}

impl IndexSchema {
    /// Conversation-scoped documents uploaded into a chat thread.
    pub fn conversation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: ID_FIELD.to_string(),
            content_field: CONTENT_FIELD.to_string(),
            scope_field: CHAT_THREAD_FIELD.to_string(),
            fields: vec![
                FieldSpec::string(ID_FIELD).key().filterable(),
                FieldSpec::string(USER_FIELD).searchable().filterable(),
                FieldSpec::string(CHAT_THREAD_FIELD).searchable().filterable(),
                FieldSpec::string(CONTENT_FIELD).searchable(),
                FieldSpec::string(ORIGIN_NAME_FIELD).searchable(),
                FieldSpec::string(PATH_FIELD),
                FieldSpec::string(CONTENT_TYPE_FIELD).filterable().facetable(),
                FieldSpec::new(LAST_MODIFIED_FIELD, FieldType::DateTimeOffset).sortable(),
                FieldSpec::new(SIZE_FIELD, FieldType::Int64),
            ],
        }
    }

    /// Externally-sourced library documents, owned by their item path.
    pub fn library(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: ID_FIELD.to_string(),
            content_field: CONTENT_FIELD.to_string(),
            scope_field: PATH_FIELD.to_string(),
            fields: vec![
                FieldSpec::string(ID_FIELD).key().filterable(),
                FieldSpec::string(CONTENT_FIELD).searchable(),
                FieldSpec::string(ORIGIN_NAME_FIELD).searchable().filterable(),
                FieldSpec::string(PATH_FIELD).filterable(),
                FieldSpec::string(CONTENT_TYPE_FIELD).filterable().facetable(),
                FieldSpec::new(LAST_MODIFIED_FIELD, FieldType::DateTimeOffset)
                    .filterable()
                    .sortable(),
                FieldSpec::new(SIZE_FIELD, FieldType::Int64).filterable().sortable(),
            ],
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Map a field name used in a filter to the declared field it refers to.
    /// `ownerScope` names the scope field unless the schema declares a field
    /// with that exact name.
    pub fn resolve_field<'a>(&'a self, name: &'a str) -> &'a str {
        if name == OWNER_SCOPE_ALIAS && !self.has_field(name) {
            &self.scope_field
        } else {
            name
        }
    }

    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.searchable)
    }

    /// Check the structural invariants every backend relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(IndexError::InvalidConfig("index name must not be empty".to_string()));
        }
        let keys: Vec<&FieldSpec> = self.fields.iter().filter(|f| f.key).collect();
        match keys.as_slice() {
            [key] if key.name == self.key_field => {}
            [key] => {
                return Err(IndexError::InvalidConfig(format!(
                    "key field is '{}' but schema declares '{}'",
                    key.name, self.key_field
                )))
            }
            _ => {
                return Err(IndexError::InvalidConfig(format!(
                    "index '{}' must declare exactly one key field, found {}",
                    self.name,
                    keys.len()
                )))
            }
        }
        for name in [&self.key_field, &self.content_field, &self.scope_field] {
            let field = self.field(name).ok_or_else(|| {
                IndexError::InvalidConfig(format!("index '{}' has no field '{name}'", self.name))
            })?;
            if field.field_type != FieldType::String {
                return Err(IndexError::InvalidConfig(format!(
                    "field '{name}' of index '{}' must be a string",
                    self.name
                )));
            }
        }
        if let Some(scope) = self.field(&self.scope_field) {
            if !scope.filterable {
                return Err(IndexError::InvalidConfig(format!(
                    "scope field '{}' must be filterable",
                    scope.name
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for f in &self.fields {
            if !seen.insert(f.name.as_str()) {
                return Err(IndexError::InvalidConfig(format!("duplicate field '{}'", f.name)));
            }
        }
        Ok(())
    }
}

/// Configuration lookup from index name to its declared schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, IndexSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register both concrete schemas under the supplied index names.
    pub fn with_defaults(conversation_index: &str, library_index: &str) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(IndexSchema::conversation(conversation_index))?;
        registry.register(IndexSchema::library(library_index))?;
        Ok(registry)
    }

    pub fn register(&mut self, schema: IndexSchema) -> Result<()> {
        schema.validate()?;
        if self.schemas.contains_key(&schema.name) {
            return Err(IndexError::InvalidConfig(format!(
                "index '{}' is already registered",
                schema.name
            )));
        }
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&IndexSchema> {
        self.schemas.get(name).ok_or_else(|| IndexError::UnknownSchema(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_schemas_validate() {
        IndexSchema::conversation("chat").validate().expect("conversation schema");
        IndexSchema::library("lib").validate().expect("library schema");
    }

    #[test]
    fn two_key_fields_are_rejected() {
        let mut schema = IndexSchema::conversation("chat");
        schema.fields.push(FieldSpec::string("other").key());
        assert!(matches!(schema.validate(), Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn scope_field_must_be_filterable() {
        let mut schema = IndexSchema::library("lib");
        schema.scope_field = CONTENT_FIELD.to_string();
        assert!(schema.validate().is_err());
    }

    #[test]
    fn owner_scope_resolves_to_the_scope_field() {
        assert_eq!(IndexSchema::conversation("chat").resolve_field(OWNER_SCOPE_ALIAS), CHAT_THREAD_FIELD);
        assert_eq!(IndexSchema::library("lib").resolve_field(OWNER_SCOPE_ALIAS), PATH_FIELD);
        assert_eq!(IndexSchema::library("lib").resolve_field(SIZE_FIELD), SIZE_FIELD);
    }

    #[test]
    fn descriptor_uses_edm_type_names() {
        let json = serde_json::to_value(IndexSchema::conversation("chat")).expect("serialize");
        assert_eq!(json["keyField"], "id");
        assert_eq!(json["fields"][7]["type"], "Edm.DateTimeOffset");
        assert_eq!(json["fields"][8]["type"], "Edm.Int64");
    }
}
