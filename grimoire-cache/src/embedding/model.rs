//! fastembed text embedding backend

use std::path::Path;

use fastembed::{InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::Embedder;
use crate::error::{CacheError, Result};

/// fastembed model wrapper
///
/// The ONNX session is guarded by a mutex so concurrent callers interleave
/// safely without external locking.
pub struct FastEmbedModel {
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

impl FastEmbedModel {
    /// Load (downloading on first use) the named model into `cache_dir`
    pub fn load(model_name: &str, cache_dir: &Path) -> Result<Self> {
        let model_enum = parse_model_name(model_name)?;

        std::fs::create_dir_all(cache_dir).map_err(|e| {
            CacheError::model(format!(
                "Failed to create models directory {}: {}",
                cache_dir.display(),
                e
            ))
        })?;

        log::info!(
            "Loading embedding model {} from {}",
            model_name,
            cache_dir.display()
        );

        let options = InitOptions::new(model_enum)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| CacheError::model(format!("Failed to load {}: {}", model_name, e)))?;

        let dimension = detect_dimension(&mut model)?;
        log::info!("Loaded embedding model {} ({}d)", model_name, dimension);

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }
}

impl Embedder for FastEmbedModel {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        #[allow(unused_mut)]
        let mut model = self.model.lock();
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| CacheError::embedding(format!("Failed to encode texts: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[allow(unused_mut)]
fn detect_dimension(model: &mut TextEmbedding) -> Result<usize> {
    let sample = model
        .embed(vec!["test"], None)
        .map_err(|e| CacheError::model(format!("Failed to detect dimensions: {}", e)))?;

    sample
        .first()
        .map(|v| v.len())
        .ok_or_else(|| CacheError::model("Model returned no embedding"))
}

/// Map a model name to the fastembed enum
pub fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        _ => Err(CacheError::model(format!(
            "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix for quantized)",
            name
        ))),
    }
}
