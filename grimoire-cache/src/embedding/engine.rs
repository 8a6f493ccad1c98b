//! Embedding service
//!
//! High-level API for generating and caching embeddings. The model is loaded
//! on first use, not at construction.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::discovery::find_models_dir;
use super::model::FastEmbedModel;
use super::text::record_text;
use super::Embedder;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::record::Record;

/// Text cache capacity when none is configured
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

type Loader = Box<dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync>;

enum ModelState {
    Unloaded,
    Ready(Arc<dyn Embedder>),
    /// Load failed; the message is reported to every later caller
    Failed(String),
}

/// Lazily-loaded embedding model with a bounded text cache
///
/// Construct once and share by `Arc`. Concurrent callers may interleave
/// freely; the first one pays the model load.
pub struct EmbeddingService {
    loader: Loader,
    state: Mutex<ModelState>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    batch_size: usize,
}

impl EmbeddingService {
    /// Service backed by fastembed, configured from `config`
    pub fn new(config: &CacheConfig) -> Self {
        let model_name = config.embedding_model.clone();
        let models_dir = find_models_dir(config.models_dir.as_deref());

        Self::with_loader(config.embedding_batch_size, move || {
            let model = FastEmbedModel::load(&model_name, &models_dir)?;
            Ok(Arc::new(model) as Arc<dyn Embedder>)
        })
        .with_cache_capacity(config.embedding_cache_size)
    }

    /// Service with a custom model loader, still invoked lazily
    pub fn with_loader<F>(batch_size: usize, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Embedder>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            state: Mutex::new(ModelState::Unloaded),
            cache: Mutex::new(LruCache::new(cache_capacity(DEFAULT_CACHE_CAPACITY))),
            batch_size: batch_size.max(1),
        }
    }

    /// Replace the text cache with one holding at most `capacity` entries
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        *self.cache.lock() = LruCache::new(cache_capacity(capacity));
        self
    }

    /// Service around an already-loaded embedder
    pub fn from_embedder(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        let service = Self::with_loader(batch_size, || {
            Err(CacheError::model("embedder was supplied pre-loaded"))
        });
        *service.state.lock() = ModelState::Ready(embedder);
        service
    }

    /// Get the model, loading it on first call
    fn model(&self) -> Result<Arc<dyn Embedder>> {
        let mut state = self.state.lock();
        match &*state {
            ModelState::Ready(model) => return Ok(model.clone()),
            ModelState::Failed(msg) => return Err(CacheError::model(msg.clone())),
            ModelState::Unloaded => {}
        }

        match (self.loader)() {
            Ok(model) => {
                *state = ModelState::Ready(model.clone());
                Ok(model)
            }
            Err(e) => {
                log::error!("Embedding model unavailable: {}", e);
                *state = ModelState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Whether the model has been loaded successfully
    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), ModelState::Ready(_))
    }

    /// Embedding dimension, once the model is loaded
    pub fn dimension(&self) -> Option<usize> {
        match &*self.state.lock() {
            ModelState::Ready(model) => Some(model.dimension()),
            _ => None,
        }
    }

    /// Embed a single text with caching
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.lock().get(text) {
            return Ok(cached.clone());
        }

        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| CacheError::embedding("model returned no embedding"))
    }

    /// Batch embed with caching, in chunks of the configured batch size
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = {
            let mut cache = self.cache.lock();
            texts.iter().map(|text| cache.get(text).cloned()).collect()
        };

        let uncached: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| i)
            .collect();

        if !uncached.is_empty() {
            let model = self.model()?;

            for chunk in uncached.chunks(self.batch_size) {
                let chunk_texts: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
                let vectors = model.embed_batch(&chunk_texts)?;
                if vectors.len() != chunk_texts.len() {
                    return Err(CacheError::embedding(format!(
                        "model returned {} vectors for {} texts",
                        vectors.len(),
                        chunk_texts.len()
                    )));
                }

                let mut cache = self.cache.lock();
                for (&idx, vector) in chunk.iter().zip(vectors) {
                    cache.put(texts[idx].clone(), vector.clone());
                    results[idx] = Some(vector);
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Embed records using their type-specific text
    pub fn embed_records(&self, records: &[Record]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = records.iter().map(record_text).collect();
        self.embed_batch(&texts)
    }

    /// Number of cached texts
    pub fn cache_size(&self) -> usize {
        self.cache.lock().len()
    }

    /// Most texts the cache will hold
    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
