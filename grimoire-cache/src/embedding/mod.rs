//! Embedding module for semantic search
//!
//! Uses fastembed (BGE-Small-EN-v1.5 by default) behind the [`Embedder`] trait.

mod discovery;
mod engine;
mod model;
mod text;

pub use discovery::find_models_dir;
pub use engine::EmbeddingService;
pub use model::{parse_model_name, FastEmbedModel};
pub use text::record_text;

use crate::error::Result;

/// A text embedding backend
pub trait Embedder: Send + Sync {
    /// Encode texts into fixed-length vectors, one per input
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector length
    fn dimension(&self) -> usize;
}
