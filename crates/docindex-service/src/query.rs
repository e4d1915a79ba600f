//! Filtered search and facet counting over one index.

use std::collections::HashMap;

use docindex_core::{FacetCount, Filter, IndexError, OperationOutcome, Result, SearchBackend, SearchResult};
use futures::TryStreamExt;
use tracing::{debug, warn};

use crate::DocumentIndex;

impl<B: SearchBackend> DocumentIndex<B> {
    fn parse_filter(&self, expression: Option<&str>) -> Result<Option<Filter>> {
        let Some(expression) = expression.map(str::trim).filter(|e| !e.is_empty()) else {
            return Ok(None);
        };
        let filter = Filter::parse(expression)?;
        filter.validate(&self.schema)?;
        Ok(Some(filter))
    }

    /// Run a search and drain the cursor. The first failing item discards
    /// everything collected so far.
    pub(crate) async fn collect(
        &self,
        query_text: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        if let Some(filter) = filter {
            debug!(index = %self.schema.name, filter = %filter, "search filter");
        }
        let cursor = self.backend.search(&self.schema.name, query_text, filter).await?;
        cursor.try_collect().await
    }

    /// Search with an optional query text and an optional filter expression.
    ///
    /// Results come back fully materialized, highest score first.
    pub async fn search(
        &self,
        query_text: Option<&str>,
        filter_expression: Option<&str>,
    ) -> OperationOutcome<Vec<SearchResult>> {
        let result = match self.parse_filter(filter_expression) {
            Ok(filter) => self.collect(query_text, filter.as_ref()).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(index = %self.schema.name, error = %err, "search failed");
        }
        result.into()
    }

    /// Count the values of a facetable field over the matching documents,
    /// most frequent first.
    pub async fn facet_counts(
        &self,
        field: &str,
        query_text: Option<&str>,
        filter_expression: Option<&str>,
    ) -> OperationOutcome<Vec<FacetCount>> {
        let result = self.count_values(field, query_text, filter_expression).await;
        if let Err(err) = &result {
            warn!(index = %self.schema.name, field, error = %err, "facet count failed");
        }
        result.into()
    }

    async fn count_values(
        &self,
        field: &str,
        query_text: Option<&str>,
        filter_expression: Option<&str>,
    ) -> Result<Vec<FacetCount>> {
        if !self.schema.field(field).is_some_and(|f| f.facetable) {
            return Err(IndexError::InvalidFilter(format!("field '{field}' is not facetable")));
        }
        let filter = self.parse_filter(filter_expression)?;
        let results = self.collect(query_text, filter.as_ref()).await?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for hit in &results {
            if let Some(value) = hit.document.value_of(&self.schema, field) {
                *counts.entry(value.to_string()).or_default() += 1;
            }
        }
        let mut facets: Vec<FacetCount> =
            counts.into_iter().map(|(value, count)| FacetCount { value, count }).collect();
        facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Ok(facets)
    }
}
