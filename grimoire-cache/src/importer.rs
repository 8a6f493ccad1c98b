//! Bulk importer
//!
//! Turns producer payloads into records and writes them through one atomic
//! upsert per call. Bad records are skipped and reported, never fatal;
//! storage failures abort the whole batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{CacheConfig, OFFLINE_IMPORT_SOURCE};
use crate::embedding::{record_text, EmbeddingService};
use crate::error::{CacheError, Result};
use crate::record::{Record, RecordType};
use crate::store::{Admission, EntityStore};

/// Records handed to the model per backfill round
const BACKFILL_CHUNK: usize = 256;

/// Priority tier of a producer, higher wins conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    OfflineImport,
    RemoteApi,
}

/// Ordered source table consulted by a single comparison
#[derive(Debug, Clone)]
pub struct SourcePriority {
    table: Vec<(String, SourceTier)>,
    default_tier: SourceTier,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self {
            table: vec![(OFFLINE_IMPORT_SOURCE.to_string(), SourceTier::OfflineImport)],
            default_tier: SourceTier::RemoteApi,
        }
    }
}

impl SourcePriority {
    /// Unlisted producers are remote APIs; `offline_sources` rank below them
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            table: config
                .offline_sources
                .iter()
                .map(|s| (s.clone(), SourceTier::OfflineImport))
                .collect(),
            default_tier: SourceTier::RemoteApi,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>, tier: SourceTier) -> Self {
        let source = source.into();
        self.table.retain(|(s, _)| *s != source);
        self.table.push((source, tier));
        self
    }

    pub fn tier(&self, source: &str) -> SourceTier {
        self.table
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, tier)| *tier)
            .unwrap_or(self.default_tier)
    }

    /// Whether a stored record from `existing` must survive `incoming`.
    /// Equal tiers never outrank each other (last write wins).
    pub fn outranks(&self, existing: &str, incoming: &str) -> bool {
        self.tier(existing) > self.tier(incoming)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Overwrite regardless of source priority
    pub force: bool,
    /// Generate embeddings for admitted records
    pub embed: bool,
}

/// Why a candidate was not committed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// Position in the submitted batch
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub batch_id: Uuid,
    pub record_type: RecordType,
    pub committed: usize,
    pub skipped: usize,
    pub skipped_reasons: Vec<SkippedRecord>,
    /// Indexed fields dropped because their value could not be coerced
    pub coercion_warnings: usize,
    pub embedded: usize,
}

/// Validating, priority-aware writer in front of the entity store
pub struct BulkImporter {
    store: Arc<EntityStore>,
    embeddings: Option<Arc<EmbeddingService>>,
    priority: SourcePriority,
}

impl BulkImporter {
    pub fn new(store: Arc<EntityStore>, priority: SourcePriority) -> Self {
        Self {
            store,
            embeddings: None,
            priority,
        }
    }

    pub fn with_embeddings(mut self, embeddings: Arc<EmbeddingService>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Validate, resolve conflicts and atomically write a batch
    pub fn import(
        &self,
        record_type: RecordType,
        candidates: Vec<Value>,
        source_api: &str,
        options: &ImportOptions,
    ) -> Result<ImportSummary> {
        let source_api = source_api.trim();
        if source_api.is_empty() {
            return Err(CacheError::validation("source_api must not be empty"));
        }

        let batch_id = Uuid::new_v4();
        log::info!(
            "Import {} started: {} {} candidates from '{}'",
            batch_id,
            candidates.len(),
            record_type,
            source_api
        );

        let mut skipped_reasons = Vec::new();
        let mut coercion_warnings = 0;
        let mut records: Vec<Record> = Vec::with_capacity(candidates.len());
        // Batch position per slug, the later duplicate wins
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (index, candidate) in candidates.into_iter().enumerate() {
            let slug = candidate
                .get("slug")
                .and_then(Value::as_str)
                .map(String::from);

            match Record::from_payload(record_type, candidate, source_api) {
                Ok(normalized) => {
                    for warning in &normalized.warnings {
                        log::warn!(
                            "{} '{}': dropping indexed field '{}' with value {}",
                            record_type,
                            warning.slug,
                            warning.field.name(),
                            warning.value
                        );
                    }
                    coercion_warnings += normalized.warnings.len();
                    positions.insert(normalized.record.slug.clone(), index);
                    records.push(normalized.record);
                }
                Err(e) => {
                    log::warn!("Skipping {} candidate #{}: {}", record_type, index, e);
                    skipped_reasons.push(SkippedRecord {
                        index,
                        slug,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let force = options.force;
        let mut embedded = if options.embed {
            self.attach_embeddings(record_type, &mut records, force)
        } else {
            HashSet::new()
        };

        let report = self
            .store
            .upsert_batch_with(record_type, records, |existing, incoming| {
                self.admit(existing, incoming, force)
            })?;

        for (slug, reason) in &report.rejected {
            log::info!("Conflict skip for {} '{}': {}", record_type, slug, reason);
            embedded.remove(slug);
            let index = positions.get(slug).copied().unwrap_or_default();
            skipped_reasons.push(SkippedRecord {
                index,
                slug: Some(slug.clone()),
                reason: reason.clone(),
            });
        }
        skipped_reasons.sort_by_key(|s| s.index);

        let summary = ImportSummary {
            batch_id,
            record_type,
            committed: report.committed,
            skipped: skipped_reasons.len(),
            skipped_reasons,
            coercion_warnings,
            embedded: embedded.len(),
        };

        log::info!(
            "Import {} finished: {} committed, {} skipped, {} coercion warnings",
            batch_id,
            summary.committed,
            summary.skipped,
            summary.coercion_warnings
        );
        Ok(summary)
    }

    fn admit(&self, existing: Option<&Record>, incoming: &Record, force: bool) -> Admission {
        match existing {
            Some(current) if !force && self.priority.outranks(&current.source_api, &incoming.source_api) => {
                Admission::Reject(format!(
                    "existing record from higher-priority source '{}' kept over '{}'",
                    current.source_api, incoming.source_api
                ))
            }
            _ => Admission::Accept,
        }
    }

    /// Embed the records the store would admit, in place
    ///
    /// Returns the slugs that received a vector. Records the current store
    /// contents would reject are not sent to the model; failure leaves every
    /// record without a vector.
    fn attach_embeddings(
        &self,
        record_type: RecordType,
        records: &mut [Record],
        force: bool,
    ) -> HashSet<String> {
        let Some(embeddings) = &self.embeddings else {
            log::debug!("No embedding service attached, storing without vectors");
            return HashSet::new();
        };

        let admitted: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                let existing = self.store.get(record_type, &record.slug);
                self.admit(existing.as_ref(), record, force) == Admission::Accept
            })
            .map(|(i, _)| i)
            .collect();
        if admitted.is_empty() {
            return HashSet::new();
        }

        let texts: Vec<String> = admitted.iter().map(|&i| record_text(&records[i])).collect();
        match embeddings.embed_batch(&texts) {
            Ok(vectors) => admitted
                .into_iter()
                .zip(vectors)
                .map(|(i, vector)| {
                    records[i].embedding = Some(vector);
                    records[i].slug.clone()
                })
                .collect(),
            Err(e) => {
                log::warn!("Embedding failed, storing records without vectors: {}", e);
                HashSet::new()
            }
        }
    }

    /// Generate vectors for stored records that lack one
    pub fn backfill_embeddings(&self, record_type: RecordType) -> Result<usize> {
        let embeddings = self
            .embeddings
            .as_ref()
            .ok_or_else(|| CacheError::model("no embedding service attached"))?;

        let missing = self.store.missing_embeddings(record_type);
        if missing.is_empty() {
            return Ok(0);
        }
        log::info!("Backfilling embeddings for {} {}", missing.len(), record_type);

        let mut total = 0;
        for chunk in missing.chunks(BACKFILL_CHUNK) {
            let vectors = embeddings.embed_records(chunk)?;
            let pairs = chunk
                .iter()
                .map(|r| r.slug.clone())
                .zip(vectors)
                .collect();
            total += self.store.set_embeddings(record_type, pairs)?;
        }
        Ok(total)
    }
}
