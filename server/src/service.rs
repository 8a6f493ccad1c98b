//! Async facade over the content cache
//!
//! Wraps the synchronous engine for a Tokio runtime. Writes, embedding,
//! searches and aggregate reads run on the blocking pool; point reads are
//! served inline from the in-memory mirror.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use grimoire_cache::{
    BulkImporter, CacheConfig, CacheError, DocumentCatalog, DocumentInfo, DocumentMetadata,
    DocumentSummary, Embedder, EmbeddingService, EntityStore, FilterExpressionBuilder, Filters,
    ImportOptions, ImportSummary, Record, RecordType, SearchHit, SemanticSearchEngine,
    SourcePriority, DEFAULT_SEARCH_LIMIT,
};

use crate::error::{ServiceError, ServiceResult};

/// Everything that exists once the store is open
struct Engine {
    config: CacheConfig,
    store: Arc<EntityStore>,
    embeddings: Arc<EmbeddingService>,
    importer: BulkImporter,
    search: SemanticSearchEngine,
    catalog: DocumentCatalog,
}

/// Content cache service
///
/// Holds the engine behind an async lock so it can be constructed before the
/// data directory is known and initialized later.
pub struct ContentService {
    engine: Arc<RwLock<Option<Arc<Engine>>>>,
    config: CacheConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ContentService {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            engine: Arc::new(RwLock::new(None)),
            config,
            embedder: None,
        }
    }

    /// Use a pre-loaded embedder instead of the configured fastembed model
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Open the store, replacing any previously opened one
    ///
    /// `data_dir` overrides the configured directory. The embedding model is
    /// not loaded here; it loads on first use.
    pub async fn initialize(&self, data_dir: Option<&Path>) -> ServiceResult<()> {
        let mut config = self.config.clone();
        if let Some(dir) = data_dir {
            config.data_dir = dir.to_path_buf();
        }
        tracing::info!("[ContentService::initialize] Data directory: {:?}", config.data_dir);

        // Release the previous handle first; RocksDB holds an exclusive lock
        *self.engine.write().await = None;

        let embedder = self.embedder.clone();
        let engine = tokio::task::spawn_blocking(move || -> grimoire_cache::Result<Engine> {
            let store = Arc::new(EntityStore::open(&config).map_err(|e| {
                tracing::error!("[ContentService::initialize] Failed to open store: {}", e);
                e
            })?);

            let embeddings = Arc::new(match embedder {
                Some(embedder) => {
                    EmbeddingService::from_embedder(embedder, config.embedding_batch_size)
                        .with_cache_capacity(config.embedding_cache_size)
                }
                None => EmbeddingService::new(&config),
            });

            let importer = BulkImporter::new(store.clone(), SourcePriority::from_config(&config))
                .with_embeddings(embeddings.clone());
            let search = SemanticSearchEngine::new(store.clone(), embeddings.clone());
            let catalog = DocumentCatalog::new(store.clone());

            Ok(Engine {
                config,
                store,
                embeddings,
                importer,
                search,
                catalog,
            })
        })
        .await??;

        *self.engine.write().await = Some(Arc::new(engine));
        tracing::info!("[ContentService::initialize] Content cache ready");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Fetch one record by slug
    pub async fn get_entity(
        &self,
        record_type: RecordType,
        slug: &str,
    ) -> ServiceResult<Option<Record>> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(CacheError::validation("slug must not be empty").into());
        }
        let engine = self.engine().await?;
        Ok(engine.store.get(record_type, slug))
    }

    /// Records matching every filter, ordered by slug
    pub async fn query_entities(
        &self,
        record_type: RecordType,
        filters: Filters,
    ) -> ServiceResult<Vec<Record>> {
        self.run(move |engine| {
            let predicate = FilterExpressionBuilder::new(record_type).build(&filters)?;
            Ok(engine.store.query(record_type, &predicate))
        })
        .await
    }

    /// Similarity search with structured fallback
    pub async fn semantic_search(
        &self,
        record_type: RecordType,
        query_text: String,
        filters: Filters,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<SearchHit>> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        self.run(move |engine| engine.search.search(record_type, &query_text, &filters, limit))
            .await
    }

    /// Import a batch from one producer
    pub async fn bulk_upsert(
        &self,
        record_type: RecordType,
        records: Vec<Value>,
        source_api: String,
        force: bool,
    ) -> ServiceResult<ImportSummary> {
        let summary = self
            .run(move |engine| {
                let options = ImportOptions {
                    force,
                    embed: engine.config.embed_on_import,
                };
                engine
                    .importer
                    .import(record_type, records, &source_api, &options)
            })
            .await?;

        if summary.skipped > 0 {
            tracing::warn!(
                "Import {} skipped {} {} records",
                summary.batch_id,
                summary.skipped,
                record_type
            );
        }
        Ok(summary)
    }

    pub async fn list_documents(
        &self,
        source_api: Option<String>,
    ) -> ServiceResult<Vec<DocumentSummary>> {
        self.run(move |engine| Ok(engine.catalog.list_documents(source_api.as_deref())))
            .await
    }

    pub async fn get_document_metadata(
        &self,
        document_key: &str,
    ) -> ServiceResult<Option<DocumentMetadata>> {
        let document_key = document_key.to_string();
        self.run(move |engine| Ok(engine.catalog.get_document_metadata(&document_key)))
            .await
    }

    pub async fn register_document(&self, info: DocumentInfo) -> ServiceResult<()> {
        self.run(move |engine| engine.catalog.register_document(info))
            .await
    }

    /// Embed stored records that have no vector yet
    pub async fn backfill_embeddings(&self, record_type: RecordType) -> ServiceResult<usize> {
        let count = self
            .run(move |engine| engine.importer.backfill_embeddings(record_type))
            .await?;
        tracing::info!("Backfilled {} {} embeddings", count, record_type);
        Ok(count)
    }

    /// Store and model statistics
    pub async fn stats(&self) -> ServiceResult<Value> {
        self.run(|engine| {
            let mut stats = engine.store.stats();
            if let Value::Object(map) = &mut stats {
                map.insert(
                    "dataDir".to_string(),
                    Value::String(engine.config.data_dir.display().to_string()),
                );
                map.insert(
                    "embedding".to_string(),
                    serde_json::json!({
                        "model": engine.config.embedding_model,
                        "loaded": engine.embeddings.is_loaded(),
                        "dimension": engine.embeddings.dimension(),
                        "cachedTexts": engine.embeddings.cache_size(),
                        "cacheCapacity": engine.embeddings.cache_capacity(),
                    }),
                );
            }
            Ok(stats)
        })
        .await
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> ServiceResult<()> {
        self.run(|engine| engine.store.flush()).await
    }

    /// Run `f` against the engine on the blocking pool
    async fn run<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&Engine) -> grimoire_cache::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine().await?;
        let value = tokio::task::spawn_blocking(move || f(engine.as_ref())).await??;
        Ok(value)
    }

    /// Get the engine, returning error if not initialized
    async fn engine(&self) -> ServiceResult<Arc<Engine>> {
        self.engine
            .read()
            .await
            .clone()
            .ok_or(ServiceError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimoire_cache::{filters_from_json, OFFLINE_IMPORT_SOURCE};
    use serde_json::json;
    use tempfile::TempDir;

    /// Bag-of-letters embedder, deterministic and model-free
    struct LetterEmbedder;

    impl Embedder for LetterEmbedder {
        fn embed_batch(&self, texts: &[String]) -> grimoire_cache::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            26
        }
    }

    fn filters(value: Value) -> Filters {
        filters_from_json(value).unwrap()
    }

    async fn service(dir: &TempDir) -> ContentService {
        let config = CacheConfig::default()
            .with_data_dir(dir.path())
            .with_embed_on_import(true);
        let service = ContentService::new(config).with_embedder(Arc::new(LetterEmbedder));
        service.initialize(None).await.unwrap();
        service
    }

    fn fireball() -> Value {
        json!({
            "slug": "fireball",
            "name": "Fireball",
            "level": 3,
            "school": "Evocation",
            "document_name": "SRD",
            "desc": "A bright streak flashes to a point you choose.",
        })
    }

    #[tokio::test]
    async fn test_service_uninitialized() {
        let service = ContentService::new(CacheConfig::default());
        assert!(!service.is_initialized().await);

        let err = service
            .get_entity(RecordType::Spell, "fireball")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotInitialized));
        assert_eq!(err.code(), "unavailable");
    }

    #[tokio::test]
    async fn test_fireball_end_to_end() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        let summary = service
            .bulk_upsert(RecordType::Spell, vec![fireball()], "api-a".into(), false)
            .await
            .unwrap();
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.embedded, 1);

        let record = service
            .get_entity(RecordType::Spell, "fireball")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.document_name, "SRD");
        assert_eq!(record.source_api, "api-a");

        let hits = service
            .query_entities(RecordType::Spell, filters(json!({"level_min": 3, "level_max": 3})))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "fireball");

        let docs = service.list_documents(None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document_name, "SRD");
        assert_eq!(docs[0].source_api, "api-a");
        assert_eq!(docs[0].entity_count, 1);

        let meta = service.get_document_metadata("srd").await.unwrap().unwrap();
        assert_eq!(meta.source_apis, vec!["api-a"]);
    }

    #[tokio::test]
    async fn test_filter_conjunction_and_validation() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        service
            .bulk_upsert(
                RecordType::Spell,
                vec![
                    fireball(),
                    json!({"slug": "counterspell", "level": 3, "school": "abjuration", "document_name": "SRD"}),
                    json!({"slug": "cone-of-cold", "level": 5, "school": "evocation", "document_name": "SRD"}),
                ],
                "api-a".into(),
                false,
            )
            .await
            .unwrap();

        let hits = service
            .query_entities(
                RecordType::Spell,
                filters(json!({"level": 3, "school": "evocation"})),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "fireball");

        let err = service
            .query_entities(RecordType::Spell, filters(json!({"hit_points": 10})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_params");

        let none = service
            .query_entities(RecordType::Spell, filters(json!({"document": []})))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_search_and_fallback() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        service
            .bulk_upsert(
                RecordType::Creature,
                vec![
                    json!({"slug": "goblin", "name": "Goblin", "challenge_rating": "1/4", "document_name": "SRD"}),
                    json!({"slug": "zombie", "name": "Zombie", "challenge_rating": 0.25, "document_name": "SRD"}),
                    json!({"slug": "lich", "name": "Lich", "challenge_rating": 21, "document_name": "SRD"}),
                ],
                "api-a".into(),
                false,
            )
            .await
            .unwrap();

        let hits = service
            .semantic_search(RecordType::Creature, "zombie".into(), Filters::new(), Some(3))
            .await
            .unwrap();
        assert_eq!(hits[0].record.slug, "zombie");
        assert!(hits[0].score.is_some());

        let cr = filters(json!({"challenge_rating_max": 1}));
        let blank = service
            .semantic_search(RecordType::Creature, String::new(), cr.clone(), None)
            .await
            .unwrap();
        let queried = service
            .query_entities(RecordType::Creature, cr)
            .await
            .unwrap();
        assert_eq!(
            blank.into_iter().map(|h| h.record.slug).collect::<Vec<_>>(),
            queried.into_iter().map(|r| r.slug).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_source_priority_through_service() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        service
            .bulk_upsert(RecordType::Spell, vec![fireball()], "api-a".into(), false)
            .await
            .unwrap();

        let mut offline = fireball();
        offline["desc"] = json!("offline text");
        let summary = service
            .bulk_upsert(
                RecordType::Spell,
                vec![offline.clone()],
                OFFLINE_IMPORT_SOURCE.into(),
                false,
            )
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);

        let kept = service
            .get_entity(RecordType::Spell, "fireball")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.source_api, "api-a");

        service
            .bulk_upsert(RecordType::Spell, vec![offline], OFFLINE_IMPORT_SOURCE.into(), true)
            .await
            .unwrap();
        let forced = service
            .get_entity(RecordType::Spell, "fireball")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forced.payload["desc"], "offline text");
    }

    #[tokio::test]
    async fn test_persists_across_restart() {
        let dir = TempDir::new().unwrap();
        {
            let service = service(&dir).await;
            service
                .bulk_upsert(RecordType::Spell, vec![fireball()], "api-a".into(), false)
                .await
                .unwrap();
            service
                .register_document(DocumentInfo::new("srd", "Systems Reference Document"))
                .await
                .unwrap();
            service.flush().await.unwrap();
        }

        let service = service(&dir).await;
        let record = service
            .get_entity(RecordType::Spell, "fireball")
            .await
            .unwrap()
            .unwrap();
        assert!(record.embedding.is_some());

        let meta = service.get_document_metadata("srd").await.unwrap().unwrap();
        assert_eq!(meta.info.unwrap().title, "Systems Reference Document");

        let stats = service.stats().await.unwrap();
        assert_eq!(stats["collections"]["spells"]["records"], 1);
        assert_eq!(stats["collections"]["spells"]["embedded"], 1);
    }

    #[tokio::test]
    async fn test_backfill() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::default().with_data_dir(dir.path());
        let service = ContentService::new(config).with_embedder(Arc::new(LetterEmbedder));
        service.initialize(None).await.unwrap();

        service
            .bulk_upsert(RecordType::Spell, vec![fireball()], "api-a".into(), false)
            .await
            .unwrap();
        assert_eq!(service.backfill_embeddings(RecordType::Spell).await.unwrap(), 1);
        assert_eq!(service.backfill_embeddings(RecordType::Spell).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_imports_and_searches() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service(&dir).await);
        service
            .bulk_upsert(RecordType::Spell, vec![fireball()], "api-a".into(), false)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for writer in 0..4 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..3 {
                    let batch: Vec<Value> = (0..10)
                        .map(|i| {
                            json!({
                                "slug": format!("spell-{}-{}-{}", writer, round, i),
                                "name": format!("Spell {} {} {}", writer, round, i),
                                "level": i % 10,
                                "document_name": "SRD",
                            })
                        })
                        .collect();
                    let summary = service
                        .bulk_upsert(RecordType::Spell, batch, format!("api-{}", writer), false)
                        .await
                        .unwrap();
                    assert_eq!(summary.committed, 10);
                    assert_eq!(summary.embedded, 10);
                }
            }));
        }
        for _ in 0..4 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let hits = service
                        .semantic_search(
                            RecordType::Spell,
                            "fireball".into(),
                            Filters::new(),
                            Some(5),
                        )
                        .await
                        .unwrap();
                    assert!(!hits.is_empty() && hits.len() <= 5);
                    assert!(hits.iter().all(|h| h.score.is_some()));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let all = service
            .query_entities(RecordType::Spell, Filters::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 121);
        assert!(all.iter().all(|r| r.embedding.is_some()));

        let hits = service
            .semantic_search(RecordType::Spell, "fireball".into(), Filters::new(), Some(1))
            .await
            .unwrap();
        assert_eq!(hits[0].record.slug, "fireball");

        let stats = service.stats().await.unwrap();
        assert_eq!(stats["collections"]["spells"]["records"], 121);
        assert!(
            stats["embedding"]["cachedTexts"].as_u64().unwrap()
                <= stats["embedding"]["cacheCapacity"].as_u64().unwrap()
        );
    }

    #[tokio::test]
    #[ignore = "requires model download"]
    async fn test_default_model_search() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::default()
            .with_data_dir(dir.path())
            .with_embed_on_import(true);
        let service = ContentService::new(config);
        service.initialize(None).await.unwrap();

        service
            .bulk_upsert(RecordType::Spell, vec![fireball()], "api-a".into(), false)
            .await
            .unwrap();
        let hits = service
            .semantic_search(RecordType::Spell, "explosion of fire".into(), Filters::new(), None)
            .await
            .unwrap();
        assert_eq!(hits[0].record.slug, "fireball");
        assert!(hits[0].score.is_some());
    }
}
