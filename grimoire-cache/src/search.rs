//! Semantic search engine
//!
//! Similarity search over one collection, narrowed by the same structured
//! filters as plain queries. Whenever similarity cannot produce an answer the
//! engine degrades to a structured query, so callers always get a result set.

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::filter::{FilterExpressionBuilder, Filters, Predicate};
use crate::record::{Record, RecordType};
use crate::store::EntityStore;

/// Default number of hits
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A search result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record: Record,
    /// Cosine similarity; `None` for fallback hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl SearchHit {
    fn unscored(record: Record) -> Self {
        Self {
            record,
            score: None,
        }
    }
}

/// Filtered similarity search with structured fallback
pub struct SemanticSearchEngine {
    store: Arc<EntityStore>,
    embeddings: Arc<EmbeddingService>,
}

impl SemanticSearchEngine {
    pub fn new(store: Arc<EntityStore>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { store, embeddings }
    }

    /// Search `record_type` for records similar to `query_text`.
    ///
    /// Filter validation errors propagate. A blank query, a model failure or
    /// an empty similarity result falls back to the structured query.
    pub fn search(
        &self,
        record_type: RecordType,
        query_text: &str,
        filters: &Filters,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let predicate = FilterExpressionBuilder::new(record_type).build(filters)?;
        if predicate.is_nothing() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_text = query_text.trim();
        if query_text.is_empty() {
            log::debug!("Blank query for {}, using structured query", record_type);
            return Ok(self.fallback(record_type, &predicate, limit));
        }

        let query_vector = match self.embeddings.embed_text(query_text) {
            Ok(vector) => vector,
            Err(e) => {
                log::warn!(
                    "Embedding query for {} failed, using structured query: {}",
                    record_type,
                    e
                );
                return Ok(self.fallback(record_type, &predicate, limit));
            }
        };

        let hits: Vec<SearchHit> = self
            .store
            .semantic_query(record_type, &query_vector, &predicate, limit)
            .into_iter()
            .map(|(record, score)| SearchHit {
                record,
                score: Some(score),
            })
            .collect();

        if hits.is_empty() {
            log::debug!("No embedded {} matched, using structured query", record_type);
            return Ok(self.fallback(record_type, &predicate, limit));
        }
        Ok(hits)
    }

    fn fallback(&self, record_type: RecordType, predicate: &Predicate, limit: usize) -> Vec<SearchHit> {
        self.store
            .query(record_type, predicate)
            .into_iter()
            .take(limit)
            .map(SearchHit::unscored)
            .collect()
    }
}
