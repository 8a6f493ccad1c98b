//! Cache configuration
//!
//! Defaults suit a local single-user cache; every value can be overridden
//! through `GRIMOIRE_*` environment variables and then by explicit setters.

use std::path::PathBuf;

/// Source name used by the offline-format importer
pub const OFFLINE_IMPORT_SOURCE: &str = "offline-import";

/// Default fastembed model
pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-small-en-v1.5";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the RocksDB files
    pub data_dir: PathBuf,
    /// Embedding model name (see `embedding::parse_model_name`)
    pub embedding_model: String,
    /// Where downloaded model files are cached; `None` uses the discovery order
    pub models_dir: Option<PathBuf>,
    /// Texts per model call
    pub embedding_batch_size: usize,
    /// Most texts whose vectors are kept in memory
    pub embedding_cache_size: usize,
    /// Generate embeddings while importing
    pub embed_on_import: bool,
    /// Producers ranked below remote APIs
    pub offline_sources: Vec<String>,
    /// HNSW build quality
    pub hnsw_ef_construction: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            models_dir: None,
            embedding_batch_size: 64,
            embedding_cache_size: 1024,
            embed_on_import: false,
            offline_sources: vec![OFFLINE_IMPORT_SOURCE.to_string()],
            hnsw_ef_construction: 100,
        }
    }
}

impl CacheConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("GRIMOIRE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("GRIMOIRE_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(dir) = std::env::var("GRIMOIRE_MODELS_PATH") {
            config.models_dir = Some(PathBuf::from(dir));
        }
        if let Ok(batch) = std::env::var("GRIMOIRE_EMBED_BATCH") {
            match batch.parse::<usize>() {
                Ok(n) if n > 0 => config.embedding_batch_size = n,
                _ => log::warn!("Ignoring invalid GRIMOIRE_EMBED_BATCH={}", batch),
            }
        }
        if let Ok(size) = std::env::var("GRIMOIRE_EMBED_CACHE") {
            match size.parse::<usize>() {
                Ok(n) if n > 0 => config.embedding_cache_size = n,
                _ => log::warn!("Ignoring invalid GRIMOIRE_EMBED_CACHE={}", size),
            }
        }
        if let Ok(flag) = std::env::var("GRIMOIRE_EMBED_ON_IMPORT") {
            config.embed_on_import = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Ok(sources) = std::env::var("GRIMOIRE_OFFLINE_SOURCES") {
            config.offline_sources = sources
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_embed_on_import(mut self, enabled: bool) -> Self {
        self.embed_on_import = enabled;
        self
    }
}

/// `~/.grimoire/cache`, or `./.grimoire/cache` without a home directory
fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".grimoire")
        .join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.offline_sources, vec![OFFLINE_IMPORT_SOURCE.to_string()]);
        assert!(config.data_dir.ends_with(".grimoire/cache"));
        assert!(!config.embed_on_import);
        assert_eq!(config.embedding_cache_size, 1024);
    }
}
