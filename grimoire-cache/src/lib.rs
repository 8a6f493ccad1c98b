//! Grimoire content cache
//!
//! Persistent, queryable cache for tabletop reference content (spells,
//! creatures, equipment and rules) collected from several producers.
//!
//! ## Features
//!
//! - **Isolated collections** - One RocksDB column family per record type, keyed by slug
//! - **Typed filters** - Per-type indexed fields with equality, membership and ranges
//! - **Source priority** - Remote API records are never silently replaced by offline imports
//! - **Semantic search** - fastembed vectors with an HNSW index and structured fallback
//! - **Document catalog** - Provenance aggregated across every collection
//!
//! ## Example
//!
//! ```ignore
//! use grimoire_cache::{BulkImporter, CacheConfig, EntityStore, ImportOptions, RecordType};
//!
//! let config = CacheConfig::from_env();
//! let store = Arc::new(EntityStore::open(&config)?);
//! let importer = BulkImporter::new(store.clone(), SourcePriority::from_config(&config));
//!
//! let summary = importer.import(
//!     RecordType::Spell,
//!     vec![json!({"slug": "fireball", "level": 3, "document_name": "SRD"})],
//!     "api-a",
//!     &ImportOptions::default(),
//! )?;
//! assert_eq!(summary.committed, 1);
//! ```

pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod importer;
pub mod migration;
pub mod record;
pub mod search;
pub mod store;

// Re-exports for convenience
pub use catalog::{DocumentCatalog, DocumentInfo, DocumentMetadata, DocumentSummary};
pub use config::{CacheConfig, OFFLINE_IMPORT_SOURCE};
pub use embedding::{Embedder, EmbeddingService};
pub use error::{CacheError, Result};
pub use filter::{filters_from_json, FilterExpressionBuilder, Filters, Predicate};
pub use importer::{
    BulkImporter, ImportOptions, ImportSummary, SkippedRecord, SourcePriority, SourceTier,
};
pub use record::{IndexedField, IndexedFields, Record, RecordType, ScalarValue};
pub use search::{SearchHit, SemanticSearchEngine, DEFAULT_SEARCH_LIMIT};
pub use store::EntityStore;
