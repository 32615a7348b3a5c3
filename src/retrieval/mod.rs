
use itertools::Itertools;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::store::VectorStore;
use crate::{Result, StudyError};

/// Chunks retrieved when the caller does not say otherwise
pub const DEFAULT_TOP_K: usize = 3;

/// Separator placed between retrieved chunks
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// A stored chunk position and its similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub index: usize,
    pub score: f32,
}

/// Cosine similarity of two vectors; 0.0 for mismatched lengths or zero vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Rank stored chunks against a query embedding.
///
/// Returns at most `top_k` chunks by descending similarity, lower chunk index
/// first on ties. A `top_k` beyond the store size returns every chunk. A query
/// embedding of another dimension than the store's is a `ServiceError`.
#[inline]
pub fn rank_chunks(
    query_embedding: &[f32],
    store: &VectorStore,
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    if top_k == 0 {
        return Err(StudyError::InvalidArgument(
            "top_k must be at least 1".to_string(),
        ));
    }

    if let Some(dimension) = store
        .embeddings()
        .first()
        .map(Vec::len)
        .filter(|&dimension| dimension != query_embedding.len())
    {
        return Err(StudyError::Service(format!(
            "query embedding has {} dimensions but the store for '{}' ({}) has {}",
            query_embedding.len(),
            store.identity(),
            store.model(),
            dimension
        )));
    }

    let ranked = store
        .embeddings()
        .iter()
        .enumerate()
        .map(|(index, embedding)| ScoredChunk {
            index,
            score: cosine_similarity(query_embedding, embedding),
        })
        .sorted_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)))
        .take(top_k)
        .collect::<Vec<_>>();

    Ok(ranked)
}

/// Embed `query` and return the `top_k` most similar chunks joined by blank lines
#[inline]
pub fn retrieve(
    query: &str,
    store: &VectorStore,
    top_k: usize,
    embedder: &dyn Embedder,
) -> Result<String> {
    if top_k == 0 {
        return Err(StudyError::InvalidArgument(
            "top_k must be at least 1".to_string(),
        ));
    }

    if store.is_empty() {
        debug!("Store for '{}' is empty, nothing to retrieve", store.identity());
        return Ok(String::new());
    }

    let query_embedding = embedder.embed(query)?;
    let ranked = rank_chunks(&query_embedding, store, top_k)?;

    debug!(
        "Retrieved chunks {:?} for query of {} bytes",
        ranked
            .iter()
            .map(|c| format!("#{}={:.3}", c.index, c.score))
            .collect::<Vec<_>>(),
        query.len()
    );

    Ok(ranked
        .iter()
        .map(|c| store.chunks()[c.index].as_str())
        .join(CHUNK_SEPARATOR))
}
