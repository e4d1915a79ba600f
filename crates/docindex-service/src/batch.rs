use std::collections::HashMap;

use docindex_core::{BatchItemResult, IndexError, IndexedDocument, OperationOutcome};
use tracing::{info, warn};

/// Map backend batch results back onto the submitted documents, in submission
/// order. Results are matched by key, never by position.
pub(crate) fn correlate(
    operation: &str,
    submitted: &[IndexedDocument],
    results: Vec<BatchItemResult>,
) -> Vec<OperationOutcome<bool>> {
    let mut by_key: HashMap<String, BatchItemResult> =
        results.into_iter().map(|r| (r.key.clone(), r)).collect();

    let outcomes: Vec<OperationOutcome<bool>> = submitted
        .iter()
        .map(|doc| match by_key.remove(&doc.id) {
            Some(result) if result.succeeded => OperationOutcome::Ok(true),
            Some(result) => {
                let err = IndexError::Document {
                    id: doc.id.clone(),
                    message: result.error_message.unwrap_or_else(|| "rejected by backend".to_string()),
                    code: result.status_code.map(|c| c.to_string()),
                };
                warn!(operation, id = %doc.id, error = %err, "document failed");
                OperationOutcome::from_error(&err)
            }
            None => {
                let err = IndexError::Document {
                    id: doc.id.clone(),
                    message: format!("no result returned for document {}", doc.id),
                    code: None,
                };
                warn!(operation, id = %doc.id, "backend returned no result for document");
                OperationOutcome::from_error(&err)
            }
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    info!(operation, succeeded, total = outcomes.len(), "batch complete");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            content: String::new(),
            owner_scope: String::new(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn results_are_matched_by_key() {
        let submitted = vec![doc("a"), doc("b"), doc("c")];
        let results = vec![
            BatchItemResult::ok("c"),
            BatchItemResult::failed("b", "too large", 413),
            BatchItemResult::ok("a"),
        ];
        let outcomes = correlate("upload", &submitted, results);
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1].errors()[0].code.as_deref(), Some("413"));
        assert!(outcomes[1].errors()[0].message.contains("too large"));
        assert!(outcomes[2].is_ok());
    }

    #[test]
    fn missing_results_become_errors() {
        let outcomes = correlate("delete", &[doc("a"), doc("b")], vec![BatchItemResult::ok("a")]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].errors()[0].message.contains("no result returned for document b"));
    }
}
