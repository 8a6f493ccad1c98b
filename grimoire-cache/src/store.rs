//! RocksDB entity store with HNSW indexing
//!
//! One column family per record type. Records are persisted as MessagePack
//! under `rec:<slug>` and their vectors as bincode under `vec:<slug>`; every
//! collection is mirrored in memory at open so reads never touch RocksDB or
//! wait on a writer batch. Unfiltered similarity queries go through an
//! instant-distance HNSW index, filtered ones scan their candidates exactly.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::{Mutex, RwLock};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompressionType, IteratorMode, Options,
    WriteBatch, DB,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::DocumentInfo;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::filter::Predicate;
use crate::record::{IndexedFields, Record, RecordType};

const RECORD_PREFIX: &str = "rec:";
const VECTOR_PREFIX: &str = "vec:";

/// Column family for registered document metadata
const DOCUMENTS_CF: &str = "documents";

/// Upper bound on HNSW candidates per query (instant-distance's default ef_search)
const HNSW_CANDIDATES: usize = 100;

/// HNSW point wrapper for semantic search
#[derive(Clone)]
struct RecordPoint {
    vector: Vec<f32>,
}

impl Point for RecordPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1 - similarity (HNSW finds minimum)
        1.0 - cosine_similarity(&self.vector, &other.vector)
    }
}

/// HNSW index wrapper, values are slugs
struct HnswIndex {
    hnsw: HnswMap<RecordPoint, String>,
}

/// One record type's in-memory mirror and write serialization
struct Collection {
    records: DashMap<String, Record>,
    hnsw_index: RwLock<Option<HnswIndex>>,
    write_lock: Mutex<()>,
}

impl Collection {
    fn new() -> Self {
        Self {
            records: DashMap::new(),
            hnsw_index: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }
}

/// Persisted form of a record, written by reference
#[derive(Serialize)]
struct StoredRecordRef<'a> {
    slug: &'a str,
    name: &'a str,
    fields: &'a IndexedFields,
    document_name: &'a str,
    document_key: &'a str,
    source_api: &'a str,
    payload: &'a Value,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

#[derive(Deserialize)]
struct StoredRecord {
    slug: String,
    name: String,
    fields: IndexedFields,
    document_name: String,
    document_key: String,
    source_api: String,
    payload: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredRecord {
    fn into_record(self) -> Record {
        Record {
            slug: self.slug,
            name: self.name,
            fields: self.fields,
            document_name: self.document_name,
            document_key: self.document_key,
            source_api: self.source_api,
            payload: self.payload,
            embedding: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn encode_record(record: &Record) -> Result<Vec<u8>> {
    let stored = StoredRecordRef {
        slug: &record.slug,
        name: &record.name,
        fields: &record.fields,
        document_name: &record.document_name,
        document_key: &record.document_key,
        source_api: &record.source_api,
        payload: &record.payload,
        created_at: &record.created_at,
        updated_at: &record.updated_at,
    };
    rmp_serde::to_vec_named(&stored).map_err(CacheError::encode)
}

fn decode_record(bytes: &[u8]) -> Result<Record> {
    rmp_serde::from_slice::<StoredRecord>(bytes)
        .map(StoredRecord::into_record)
        .map_err(CacheError::decode)
}

/// Decision of an admission check during an upsert
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Accept,
    Reject(String),
}

/// Outcome of an atomic upsert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    pub committed: usize,
    /// `(slug, reason)` for every record the admission check turned away
    pub rejected: Vec<(String, String)>,
}

/// Record count for one provenance group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCount {
    pub document_name: String,
    pub document_key: String,
    pub source_api: String,
    pub count: usize,
}

/// What one collection knows about a document key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStats {
    /// Smallest document name among the citing records
    pub document_name: String,
    pub count: usize,
    pub source_apis: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// RocksDB-backed entity store, one isolated collection per record type
pub struct EntityStore {
    db: Arc<DB>,
    collections: HashMap<RecordType, Collection>,
    documents: DashMap<String, DocumentInfo>,
    backend_calls: AtomicU64,
    ef_construction: usize,
    #[cfg(test)]
    fail_next_write: std::sync::atomic::AtomicBool,
}

impl EntityStore {
    /// Open the store at the configured data directory
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Self::open_at(&config.data_dir, config.hnsw_ef_construction)
    }

    /// Open with defaults at the given path
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path.as_ref(), CacheConfig::default().hnsw_ef_construction)
    }

    fn open_at(path: &Path, ef_construction: usize) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(DBCompressionType::Lz4);

        let descriptors = RecordType::ALL
            .iter()
            .map(|rt| rt.collection())
            .chain(std::iter::once(DOCUMENTS_CF))
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(name, cf_opts)
            });

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        crate::migration::ensure_schema_version(&db)?;

        log::info!("EntityStore opened at: {}", path.display());

        let store = Self {
            db: Arc::new(db),
            collections: RecordType::ALL
                .iter()
                .map(|rt| (*rt, Collection::new()))
                .collect(),
            documents: DashMap::new(),
            backend_calls: AtomicU64::new(0),
            ef_construction,
            #[cfg(test)]
            fail_next_write: std::sync::atomic::AtomicBool::new(false),
        };

        store.load_cache()?;
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CacheError::other(format!("missing column family '{}'", name)))
    }

    fn collection(&self, record_type: RecordType) -> &Collection {
        // Every record type gets a collection at open
        &self.collections[&record_type]
    }

    /// Load persisted records, vectors and documents into memory
    fn load_cache(&self) -> Result<()> {
        for record_type in RecordType::ALL {
            let cf = self.cf(record_type.collection())?;
            let collection = self.collection(record_type);
            let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
            let mut skipped = 0;

            for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
                let (key, value) = item?;
                let key_str = String::from_utf8_lossy(&key);

                if let Some(slug) = key_str.strip_prefix(RECORD_PREFIX) {
                    // Gracefully handle deserialization errors
                    match decode_record(&value) {
                        Ok(record) => {
                            collection.records.insert(slug.to_string(), record);
                        }
                        Err(e) => {
                            log::warn!(
                                "Failed to decode {} record {}: {}. Skipping.",
                                record_type,
                                slug,
                                e
                            );
                            skipped += 1;
                        }
                    }
                } else if let Some(slug) = key_str.strip_prefix(VECTOR_PREFIX) {
                    match bincode::deserialize::<Vec<f32>>(&value) {
                        Ok(vector) => {
                            vectors.insert(slug.to_string(), vector);
                        }
                        Err(e) => log::warn!("Failed to decode vector for {}: {}", slug, e),
                    }
                }
            }

            for (slug, vector) in vectors {
                if let Some(mut record) = collection.records.get_mut(&slug) {
                    record.embedding = Some(vector);
                }
            }

            if !collection.records.is_empty() {
                log::info!(
                    "Loaded {} {} from disk",
                    collection.records.len(),
                    record_type
                );
                if skipped > 0 {
                    log::warn!("Skipped {} {} due to decode errors", skipped, record_type);
                }
                self.rebuild_hnsw_index(record_type);
            }
        }

        let cf = self.cf(DOCUMENTS_CF)?;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            match serde_json::from_slice::<DocumentInfo>(&value) {
                Ok(info) => {
                    self.documents.insert(info.document_key.clone(), info);
                }
                Err(e) => log::warn!(
                    "Failed to decode document {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }

        Ok(())
    }

    /// Get a record by slug
    pub fn get(&self, record_type: RecordType, slug: &str) -> Option<Record> {
        self.collection(record_type)
            .records
            .get(slug)
            .map(|e| e.clone())
    }

    /// All records matching the predicate, ordered by slug
    pub fn query(&self, record_type: RecordType, predicate: &Predicate) -> Vec<Record> {
        if predicate.is_nothing() {
            return Vec::new();
        }
        self.backend_calls.fetch_add(1, Ordering::Relaxed);

        let mut records: Vec<Record> = self
            .collection(record_type)
            .records
            .iter()
            .filter(|e| predicate.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        records
    }

    /// Number of records matching the predicate
    pub fn count(&self, record_type: RecordType, predicate: &Predicate) -> usize {
        if predicate.is_nothing() {
            return 0;
        }
        self.backend_calls.fetch_add(1, Ordering::Relaxed);

        let records = &self.collection(record_type).records;
        if predicate.is_unfiltered() {
            return records.len();
        }
        records.iter().filter(|e| predicate.matches(e.value())).count()
    }

    /// Number of records of a type
    pub fn len(&self, record_type: RecordType) -> usize {
        self.collection(record_type).records.len()
    }

    /// True when no collection holds any record
    pub fn is_empty(&self) -> bool {
        self.collections.values().all(|c| c.records.is_empty())
    }

    /// Atomically upsert a batch; every record is admitted
    pub fn upsert_batch(&self, record_type: RecordType, records: Vec<Record>) -> Result<usize> {
        self.upsert_batch_with(record_type, records, |_, _| Admission::Accept)
            .map(|report| report.committed)
    }

    /// Atomically upsert a batch, consulting `admit` for each record.
    ///
    /// `admit` sees the currently stored (or earlier in-batch) record and the
    /// incoming one while the collection's write lock is held, so checks and
    /// the write are one unit. Admitted records commit together or not at
    /// all; `created_at` survives re-import and `updated_at` always advances.
    /// A later record in the batch replaces an earlier one with the same slug.
    pub fn upsert_batch_with<F>(
        &self,
        record_type: RecordType,
        records: Vec<Record>,
        mut admit: F,
    ) -> Result<UpsertReport>
    where
        F: FnMut(Option<&Record>, &Record) -> Admission,
    {
        if let Some(stray) = records.iter().find(|r| r.record_type() != record_type) {
            return Err(CacheError::validation(format!(
                "record '{}' is a {} and cannot be written to {}",
                stray.slug,
                stray.record_type(),
                record_type
            )));
        }

        let collection = self.collection(record_type);
        let _guard = collection.write_lock.lock();

        let now = Utc::now();
        let mut report = UpsertReport::default();
        let mut pending: Vec<Record> = Vec::with_capacity(records.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for mut record in records {
            let existing = match positions.get(&record.slug) {
                Some(&pos) => Some(pending[pos].clone()),
                None => collection.records.get(&record.slug).map(|e| e.clone()),
            };

            if let Admission::Reject(reason) = admit(existing.as_ref(), &record) {
                report.rejected.push((record.slug.clone(), reason));
                continue;
            }

            match &existing {
                Some(prev) => {
                    record.created_at = prev.created_at;
                    record.updated_at = if now > prev.updated_at {
                        now
                    } else {
                        prev.updated_at + chrono::Duration::microseconds(1)
                    };
                    // Unchanged text keeps its vector
                    if record.embedding.is_none()
                        && prev.name == record.name
                        && prev.payload == record.payload
                    {
                        record.embedding = prev.embedding.clone();
                    }
                }
                None => {
                    record.created_at = now;
                    record.updated_at = now;
                }
            }

            match positions.get(&record.slug) {
                Some(&pos) => pending[pos] = record,
                None => {
                    positions.insert(record.slug.clone(), pending.len());
                    pending.push(record);
                }
            }
        }

        if pending.is_empty() {
            return Ok(report);
        }

        let cf = self.cf(record_type.collection())?;
        let batch_error = |slug: &str, reason: String| CacheError::BatchWrite {
            record_type: record_type.to_string(),
            first_slug: slug.to_string(),
            reason,
        };

        let mut batch = WriteBatch::default();
        for record in &pending {
            let bytes = encode_record(record).map_err(|e| batch_error(&record.slug, e.to_string()))?;
            batch.put_cf(&cf, format!("{}{}", RECORD_PREFIX, record.slug), bytes);

            let vec_key = format!("{}{}", VECTOR_PREFIX, record.slug);
            match &record.embedding {
                Some(vector) => {
                    let bytes = bincode::serialize(vector)
                        .map_err(|e| batch_error(&record.slug, e.to_string()))?;
                    batch.put_cf(&cf, vec_key, bytes);
                }
                None => batch.delete_cf(&cf, vec_key),
            }
        }

        #[cfg(test)]
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(batch_error(&pending[0].slug, "injected failure".into()));
        }

        self.db
            .write(batch)
            .map_err(|e| batch_error(&pending[0].slug, e.to_string()))?;

        // Mirror only after RocksDB accepted the whole batch
        let vectors_touched = pending.iter().any(|r| r.embedding.is_some())
            || pending
                .iter()
                .any(|r| collection.records.get(&r.slug).is_some_and(|e| e.embedding.is_some()));
        report.committed = pending.len();
        for record in pending {
            collection.records.insert(record.slug.clone(), record);
        }
        if vectors_touched {
            self.rebuild_hnsw_index(record_type);
        }

        log::debug!(
            "Committed {} {} ({} rejected)",
            report.committed,
            record_type,
            report.rejected.len()
        );
        Ok(report)
    }

    /// Records that have no stored vector
    pub fn missing_embeddings(&self, record_type: RecordType) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .collection(record_type)
            .records
            .iter()
            .filter(|e| e.value().embedding.is_none())
            .map(|e| e.value().clone())
            .collect();
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        records
    }

    /// Atomically attach vectors to existing records; unknown slugs are ignored
    pub fn set_embeddings(
        &self,
        record_type: RecordType,
        vectors: Vec<(String, Vec<f32>)>,
    ) -> Result<usize> {
        let collection = self.collection(record_type);
        let _guard = collection.write_lock.lock();
        let cf = self.cf(record_type.collection())?;

        let known: Vec<(String, Vec<f32>)> = vectors
            .into_iter()
            .filter(|(slug, _)| collection.records.contains_key(slug))
            .collect();
        if known.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::default();
        for (slug, vector) in &known {
            let bytes = bincode::serialize(vector).map_err(|e| CacheError::BatchWrite {
                record_type: record_type.to_string(),
                first_slug: slug.clone(),
                reason: e.to_string(),
            })?;
            batch.put_cf(&cf, format!("{}{}", VECTOR_PREFIX, slug), bytes);
        }
        self.db.write(batch).map_err(|e| CacheError::BatchWrite {
            record_type: record_type.to_string(),
            first_slug: known[0].0.clone(),
            reason: e.to_string(),
        })?;

        let count = known.len();
        for (slug, vector) in known {
            if let Some(mut record) = collection.records.get_mut(&slug) {
                record.embedding = Some(vector);
            }
        }
        self.rebuild_hnsw_index(record_type);
        Ok(count)
    }

    /// Delete a record permanently (administrative)
    pub fn delete(&self, record_type: RecordType, slug: &str) -> Result<bool> {
        let collection = self.collection(record_type);
        let _guard = collection.write_lock.lock();
        let cf = self.cf(record_type.collection())?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf, format!("{}{}", RECORD_PREFIX, slug));
        batch.delete_cf(&cf, format!("{}{}", VECTOR_PREFIX, slug));
        self.db.write(batch)?;

        let removed = collection.records.remove(slug);
        if removed.as_ref().is_some_and(|(_, r)| r.embedding.is_some()) {
            self.rebuild_hnsw_index(record_type);
        }
        Ok(removed.is_some())
    }

    /// Similarity search among records matching `predicate`.
    ///
    /// Returns `(record, cosine similarity)` in descending score order.
    /// Records without a vector are never candidates.
    pub fn semantic_query(
        &self,
        record_type: RecordType,
        query_vector: &[f32],
        predicate: &Predicate,
        limit: usize,
    ) -> Vec<(Record, f32)> {
        if predicate.is_nothing() || limit == 0 {
            return Vec::new();
        }
        self.backend_calls.fetch_add(1, Ordering::Relaxed);

        if predicate.is_unfiltered() && limit <= HNSW_CANDIDATES {
            if let Some(results) = self.hnsw_search(record_type, query_vector, limit) {
                return results;
            }
        }
        self.linear_search(record_type, query_vector, predicate, limit)
    }

    /// Approximate search over the whole collection, `None` without an index
    fn hnsw_search(
        &self,
        record_type: RecordType,
        query_vector: &[f32],
        limit: usize,
    ) -> Option<Vec<(Record, f32)>> {
        let collection = self.collection(record_type);
        let index_guard = collection.hnsw_index.read();
        let index = index_guard.as_ref()?;

        let query_point = RecordPoint {
            vector: query_vector.to_vec(),
        };
        let mut search = Search::default();
        let mut results = Vec::new();

        for candidate in index.hnsw.search(&query_point, &mut search) {
            let Some(record) = collection.records.get(candidate.value).map(|e| e.clone()) else {
                continue;
            };
            let Some(vector) = record.embedding.as_deref() else {
                continue;
            };
            let similarity = cosine_similarity(query_vector, vector);
            results.push((record, similarity));

            if results.len() >= limit {
                break;
            }
        }

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Some(results)
    }

    /// Exact search over the filtered candidates
    fn linear_search(
        &self,
        record_type: RecordType,
        query_vector: &[f32],
        predicate: &Predicate,
        limit: usize,
    ) -> Vec<(Record, f32)> {
        let mut results: Vec<(Record, f32)> = self
            .collection(record_type)
            .records
            .iter()
            .filter(|e| predicate.matches(e.value()))
            .filter_map(|e| {
                let vector = e.value().embedding.as_deref()?;
                let similarity = cosine_similarity(query_vector, vector);
                Some((e.value().clone(), similarity))
            })
            .collect();

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.slug.cmp(&b.0.slug))
        });
        results.truncate(limit);
        results
    }

    /// Rebuild a collection's HNSW index from its embedded records
    fn rebuild_hnsw_index(&self, record_type: RecordType) {
        let collection = self.collection(record_type);
        let (points, slugs): (Vec<RecordPoint>, Vec<String>) = collection
            .records
            .iter()
            .filter_map(|e| {
                let vector = e.value().embedding.clone()?;
                Some((RecordPoint { vector }, e.key().clone()))
            })
            .unzip();

        if points.is_empty() {
            *collection.hnsw_index.write() = None;
            return;
        }

        // Built before taking the lock so readers keep the old index meanwhile
        let hnsw = Builder::default()
            .ef_construction(self.ef_construction)
            .build(points, slugs);
        *collection.hnsw_index.write() = Some(HnswIndex { hnsw });
    }

    /// Record counts grouped by provenance
    ///
    /// A group whose records disagree on the document key reports the
    /// smallest one.
    pub fn document_counts(&self, record_type: RecordType) -> Vec<DocumentCount> {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);

        let mut groups: HashMap<(String, String), DocumentCount> = HashMap::new();
        for entry in self.collection(record_type).records.iter() {
            let record = entry.value();
            let group = groups
                .entry((record.document_name.clone(), record.source_api.clone()))
                .or_insert_with(|| DocumentCount {
                    document_name: record.document_name.clone(),
                    document_key: record.document_key.clone(),
                    source_api: record.source_api.clone(),
                    count: 0,
                });
            if record.document_key < group.document_key {
                group.document_key = record.document_key.clone();
            }
            group.count += 1;
        }
        groups.into_values().collect()
    }

    /// Aggregate over the records of a type that cite `document_key`
    ///
    /// `None` when no record cites it. Records are read in place, not cloned.
    pub fn document_stats(
        &self,
        record_type: RecordType,
        document_key: &str,
    ) -> Option<DocumentStats> {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);

        let mut stats: Option<DocumentStats> = None;
        for entry in self.collection(record_type).records.iter() {
            let record = entry.value();
            if record.document_key != document_key {
                continue;
            }
            match &mut stats {
                None => {
                    stats = Some(DocumentStats {
                        document_name: record.document_name.clone(),
                        count: 1,
                        source_apis: BTreeSet::from([record.source_api.clone()]),
                        first_seen: record.created_at,
                        last_updated: record.updated_at,
                    });
                }
                Some(stats) => {
                    if record.document_name < stats.document_name {
                        stats.document_name = record.document_name.clone();
                    }
                    stats.count += 1;
                    if !stats.source_apis.contains(&record.source_api) {
                        stats.source_apis.insert(record.source_api.clone());
                    }
                    stats.first_seen = stats.first_seen.min(record.created_at);
                    stats.last_updated = stats.last_updated.max(record.updated_at);
                }
            }
        }
        stats
    }

    /// Persist descriptive metadata for a document
    pub fn put_document_info(&self, info: &DocumentInfo) -> Result<()> {
        let cf = self.cf(DOCUMENTS_CF)?;
        self.db
            .put_cf(&cf, info.document_key.as_bytes(), serde_json::to_vec(info)?)?;
        self.documents
            .insert(info.document_key.clone(), info.clone());
        Ok(())
    }

    pub fn document_info(&self, document_key: &str) -> Option<DocumentInfo> {
        self.documents.get(document_key).map(|e| e.clone())
    }

    /// Number of collection scans served so far
    pub fn backend_calls(&self) -> u64 {
        self.backend_calls.load(Ordering::Relaxed)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<()> {
        for record_type in RecordType::ALL {
            self.db.flush_cf(&self.cf(record_type.collection())?)?;
        }
        self.db.flush_cf(&self.cf(DOCUMENTS_CF)?)?;
        Ok(())
    }

    /// Get store statistics
    pub fn stats(&self) -> serde_json::Value {
        let mut collections = serde_json::Map::new();
        for record_type in RecordType::ALL {
            let records = &self.collection(record_type).records;
            let embedded = records.iter().filter(|e| e.embedding.is_some()).count();
            collections.insert(
                record_type.collection().to_string(),
                serde_json::json!({
                    "records": records.len(),
                    "embedded": embedded,
                }),
            );
        }

        serde_json::json!({
            "collections": collections,
            "registeredDocuments": self.documents.len(),
            "backendCalls": self.backend_calls(),
        })
    }

    #[cfg(test)]
    fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
