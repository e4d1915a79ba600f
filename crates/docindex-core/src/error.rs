use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index not found: {0}")]
    NotFound(String),

    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    #[error("Backend failure: {message}")]
    Backend { message: String, code: Option<String> },

    #[error("Document {id} failed: {message}")]
    Document { id: String, message: String, code: Option<String> },

    #[error("Could not enumerate documents for scope '{scope}': {source}")]
    Discovery {
        scope: String,
        #[source]
        source: Box<IndexError>,
    },

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Unknown index schema: {0}")]
    UnknownSchema(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Caller identity unavailable: {0}")]
    Identity(String),
}

impl IndexError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), code: None }
    }

    pub fn backend_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), code: Some(code.into()) }
    }

    /// Backend-supplied error code, looking through discovery wrappers.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Backend { code, .. } | Self::Document { code, .. } => code.as_deref(),
            Self::Discovery { source, .. } => source.code(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
