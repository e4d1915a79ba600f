//! docindex-service
//!
//! Lifecycle management for one document index: provisioning, batched ingest,
//! filtered search and scope-wide deletion. [`DocumentIndex`] is generic over
//! the backend and parameterized by an [`IndexSchema`], so conversation and
//! library indexes share a single implementation.
//!
//! Every public operation returns an [`OperationOutcome`] (or a sequence of
//! them for batch work); backend errors never escape as `Err` or panics.
use std::sync::Arc;

use docindex_core::config::ProvisionPolicy;
use docindex_core::{IdentityProvider, IndexSchema, Result, SchemaRegistry, SearchBackend};

mod batch;
pub mod ingest;
pub mod provision;
pub mod purge;
pub mod query;

pub use docindex_core::{FacetCount, OperationOutcome, OutcomeError, SearchResult};
pub use provision::Provisioner;

/// A handle on one index: the shared backend plus the schema it was declared
/// with.
pub struct DocumentIndex<B: SearchBackend> {
    pub(crate) backend: Arc<B>,
    pub(crate) schema: IndexSchema,
    pub(crate) identity: Option<Arc<dyn IdentityProvider>>,
    pub(crate) policy: ProvisionPolicy,
}

impl<B: SearchBackend> DocumentIndex<B> {
    pub fn new(backend: Arc<B>, schema: IndexSchema) -> Self {
        Self { backend, schema, identity: None, policy: ProvisionPolicy::default() }
    }

    /// Look up `name` in the registry and bind the resulting schema.
    pub fn from_registry(backend: Arc<B>, registry: &SchemaRegistry, name: &str) -> Result<Self> {
        Ok(Self::new(backend, registry.get(name)?.clone()))
    }

    /// Attach the caller identity stamped on ingested documents.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ProvisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

impl<B: SearchBackend> Clone for DocumentIndex<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            schema: self.schema.clone(),
            identity: self.identity.clone(),
            policy: self.policy,
        }
    }
}
