//! Index provisioning: fetch the descriptor, create it when missing.

use std::sync::Arc;

use docindex_core::config::ProvisionPolicy;
use docindex_core::{IndexError, IndexSchema, OperationOutcome, Result, SchemaRegistry, SearchBackend};
use tracing::{debug, info, warn};

use crate::DocumentIndex;

/// Make sure `schema.name` exists on the backend.
///
/// A failed fetch leads to one create attempt (under
/// [`ProvisionPolicy::CreateOnNotFound`] only a not-found fetch does). A create
/// that loses a race with another caller resolves by re-fetching once.
pub async fn provision<B: SearchBackend + ?Sized>(
    backend: &B,
    schema: &IndexSchema,
    policy: ProvisionPolicy,
) -> Result<IndexSchema> {
    match backend.get_index(&schema.name).await {
        Ok(existing) => return Ok(existing),
        Err(err) if policy == ProvisionPolicy::CreateOnNotFound && !err.is_not_found() => {
            warn!(index = %schema.name, error = %err, "index fetch failed, not creating");
            return Err(err);
        }
        Err(err) if err.is_not_found() => debug!(index = %schema.name, "index missing, creating"),
        Err(err) => warn!(index = %schema.name, error = %err, "index fetch failed, attempting create"),
    }

    match backend.create_index(schema).await {
        Ok(created) => {
            info!(index = %created.name, fields = created.fields.len(), "created index");
            Ok(created)
        }
        Err(IndexError::AlreadyExists(_)) => {
            debug!(index = %schema.name, "index created concurrently, re-fetching");
            backend.get_index(&schema.name).await
        }
        Err(err) => Err(err),
    }
}

/// Provisions any registered index by name.
pub struct Provisioner<B: SearchBackend> {
    backend: Arc<B>,
    registry: SchemaRegistry,
    policy: ProvisionPolicy,
}

impl<B: SearchBackend> Provisioner<B> {
    pub fn new(backend: Arc<B>, registry: SchemaRegistry, policy: ProvisionPolicy) -> Self {
        Self { backend, registry, policy }
    }

    pub async fn ensure_index(&self, name: &str) -> OperationOutcome<IndexSchema> {
        let result = match self.registry.get(name) {
            Ok(schema) => provision(self.backend.as_ref(), schema, self.policy).await,
            Err(err) => Err(err),
        };
        result.into()
    }
}

impl<B: SearchBackend> DocumentIndex<B> {
    pub(crate) async fn provision(&self) -> Result<IndexSchema> {
        provision(self.backend.as_ref(), &self.schema, self.policy).await
    }

    /// EnsureIndex for this handle's schema.
    pub async fn ensure_index(&self) -> OperationOutcome<IndexSchema> {
        self.provision().await.into()
    }
}
