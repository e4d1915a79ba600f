//! Deleting everything stored under one owner scope.

use docindex_core::{Filter, IndexError, IndexedDocument, OperationOutcome, Result, SearchBackend};
use tracing::{debug, warn};

use crate::batch::correlate;
use crate::DocumentIndex;

impl<B: SearchBackend> DocumentIndex<B> {
    /// Find every document whose scope field equals `scope_id` exactly and
    /// delete them in one batch.
    ///
    /// If the documents cannot be enumerated the result is that single error
    /// and nothing is deleted.
    pub async fn delete_by_scope(&self, scope_id: &str) -> Vec<OperationOutcome<bool>> {
        let filter = Filter::eq(self.schema.scope_field.clone(), scope_id);
        let victims: Vec<IndexedDocument> = match self.collect(None, Some(&filter)).await {
            Ok(hits) => hits.into_iter().map(|h| h.document).collect(),
            Err(source) => {
                let err = IndexError::Discovery { scope: scope_id.to_string(), source: Box::new(source) };
                warn!(index = %self.schema.name, error = %err, "scope discovery failed, nothing deleted");
                return vec![OperationOutcome::from_error(&err)];
            }
        };
        if victims.is_empty() {
            debug!(index = %self.schema.name, scope = scope_id, "no documents in scope");
            return Vec::new();
        }
        match self.remove(&victims).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(index = %self.schema.name, scope = scope_id, error = %err, "batch delete failed");
                vec![OperationOutcome::from_error(&err)]
            }
        }
    }

    async fn remove(&self, victims: &[IndexedDocument]) -> Result<Vec<OperationOutcome<bool>>> {
        debug!(index = %self.schema.name, count = victims.len(), "deleting batch");
        let results = self.backend.delete_documents(&self.schema.name, victims).await?;
        Ok(correlate("delete", victims, results))
    }
}
