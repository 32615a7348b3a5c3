// Embeddings module
// Word chunking and the embedding service boundary

pub mod chunking;
pub mod ollama;

pub use chunking::{DEFAULT_CHUNK_SIZE, chunk_text, estimate_token_count};
pub use ollama::{OllamaClient, normalize_input};

use crate::Result;

/// Turns text into fixed-dimension vectors.
///
/// Vectors are only comparable when produced by the same model, so
/// implementations report the model they embed with.
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model (e.g. `"nomic-embed-text:latest"`)
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
