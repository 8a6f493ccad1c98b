//! Document catalog
//!
//! Aggregates the provenance documents referenced by every collection into
//! one listing. Rows are keyed by `(document_name, source_api)` only; no
//! producer gets special treatment.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};
use crate::record::RecordType;
use crate::store::EntityStore;

/// Descriptive metadata registered for a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_key: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Anything else the producer knows about the document
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl DocumentInfo {
    pub fn new(document_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            document_key: document_key.into(),
            title: title.into(),
            publisher: None,
            license: None,
            url: None,
            extra: Map::new(),
        }
    }
}

/// One row of the document listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub document_name: String,
    pub document_key: String,
    pub source_api: String,
    pub entity_count: usize,
    /// Count per collection name
    pub entity_type_breakdown: BTreeMap<String, usize>,
}

/// Everything known about one document key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub document_key: String,
    pub document_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DocumentInfo>,
    pub source_apis: Vec<String>,
    pub entity_count: usize,
    pub entity_type_breakdown: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Source-agnostic view over the documents in every collection
pub struct DocumentCatalog {
    store: Arc<EntityStore>,
}

impl DocumentCatalog {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Distinct documents, largest first, optionally for one producer
    pub fn list_documents(&self, source_api: Option<&str>) -> Vec<DocumentSummary> {
        let mut rows: HashMap<(String, String), DocumentSummary> = HashMap::new();

        for record_type in RecordType::ALL {
            for group in self.store.document_counts(record_type) {
                if source_api.is_some_and(|s| s != group.source_api) {
                    continue;
                }

                let row = rows
                    .entry((group.document_name.clone(), group.source_api.clone()))
                    .or_insert_with(|| DocumentSummary {
                        document_name: group.document_name.clone(),
                        document_key: group.document_key.clone(),
                        source_api: group.source_api.clone(),
                        entity_count: 0,
                        entity_type_breakdown: BTreeMap::new(),
                    });
                if group.document_key < row.document_key {
                    row.document_key = group.document_key;
                }
                row.entity_count += group.count;
                *row
                    .entity_type_breakdown
                    .entry(record_type.collection().to_string())
                    .or_insert(0) += group.count;
            }
        }

        let mut rows: Vec<DocumentSummary> = rows.into_values().collect();
        rows.sort_by(|a, b| {
            b.entity_count
                .cmp(&a.entity_count)
                .then_with(|| a.document_name.cmp(&b.document_name))
                .then_with(|| a.source_api.cmp(&b.source_api))
        });
        rows
    }

    /// Register or replace descriptive metadata for a document
    pub fn register_document(&self, info: DocumentInfo) -> Result<()> {
        if info.document_key.trim().is_empty() {
            return Err(CacheError::validation("document_key must not be empty"));
        }
        log::info!("Registering document {}", info.document_key);
        self.store.put_document_info(&info)
    }

    /// Registered metadata merged with what the collections say about the key
    pub fn get_document_metadata(&self, document_key: &str) -> Option<DocumentMetadata> {
        let info = self.store.document_info(document_key);

        let mut document_name: Option<String> = None;
        let mut sources = BTreeSet::new();
        let mut breakdown = BTreeMap::new();
        let mut entity_count = 0;
        let mut first_seen: Option<DateTime<Utc>> = None;
        let mut last_updated: Option<DateTime<Utc>> = None;

        for record_type in RecordType::ALL {
            let Some(stats) = self.store.document_stats(record_type, document_key) else {
                continue;
            };
            breakdown.insert(record_type.collection().to_string(), stats.count);
            entity_count += stats.count;

            if document_name.as_ref().map_or(true, |name| stats.document_name < *name) {
                document_name = Some(stats.document_name);
            }
            sources.extend(stats.source_apis);
            first_seen = Some(first_seen.map_or(stats.first_seen, |t| t.min(stats.first_seen)));
            last_updated =
                Some(last_updated.map_or(stats.last_updated, |t| t.max(stats.last_updated)));
        }

        if info.is_none() && entity_count == 0 {
            return None;
        }

        let document_name = document_name
            .or_else(|| info.as_ref().map(|i| i.title.clone()))
            .unwrap_or_else(|| document_key.to_string());

        Some(DocumentMetadata {
            document_key: document_key.to_string(),
            document_name,
            info,
            source_apis: sources.into_iter().collect(),
            entity_count,
            entity_type_breakdown: breakdown,
            first_seen,
            last_updated,
        })
    }
}
