
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::generation::TextGenerator;
use crate::retrieval::{cosine_similarity, retrieve};
use crate::store::VectorStore;
use crate::{Result, StudyError};

const MIN_KEYWORD_LEN: usize = 4;
const FEEDBACK_CONTEXT_CHUNKS: usize = 3;
const FEEDBACK_MAX_TOKENS: u32 = 150;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "based", "been", "before", "being", "below",
    "between", "both", "could", "does", "doing", "down", "during", "each", "from", "further",
    "have", "having", "here", "into", "itself", "just", "like", "made", "make", "many", "more",
    "most", "much", "must", "only", "other", "over", "same", "should", "some", "such", "than",
    "that", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "under", "until", "very", "were", "what", "when", "where", "which", "while", "will", "with",
    "would", "your",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceReport {
    /// Cosine similarity between the generated text and the document centroid
    pub semantic_similarity: Option<f32>,
    /// Share of the generated text's keywords found in the source
    pub keyword_overlap: f32,
    /// 1-10 rating from the generation service
    pub feedback_score: Option<u8>,
    pub feedback: Option<String>,
}

impl RelevanceReport {
    /// Report with only the locally computed keyword overlap
    #[inline]
    pub fn unscored(source: &str, generated: &str) -> Self {
        Self {
            semantic_similarity: None,
            keyword_overlap: keyword_overlap(source, generated),
            feedback_score: None,
            feedback: None,
        }
    }
}

/// Compute every relevance measure, logging and skipping the ones whose service call fails
#[inline]
pub fn check_relevance(
    store: &VectorStore,
    source: &str,
    generated: &str,
    embedder: &dyn Embedder,
    generator: &dyn TextGenerator,
) -> RelevanceReport {
    let mut report = RelevanceReport::unscored(source, generated);

    match semantic_similarity(store, generated, embedder) {
        Ok(similarity) => report.semantic_similarity = similarity,
        Err(e) => warn!("Semantic similarity unavailable: {}", e),
    }

    match llm_feedback(store, generated, embedder, generator) {
        Ok(reply) => {
            report.feedback_score = parse_feedback_score(&reply);
            report.feedback = Some(reply.trim().to_string());
        }
        Err(e) => warn!("Relevance feedback unavailable: {}", e),
    }

    debug!("Relevance report: {:?}", report);
    report
}

/// Similarity of `generated` to the mean of the store's chunk embeddings; `None` for an empty store
#[inline]
pub fn semantic_similarity(
    store: &VectorStore,
    generated: &str,
    embedder: &dyn Embedder,
) -> Result<Option<f32>> {
    let Some(centroid) = centroid(store.embeddings()) else {
        return Ok(None);
    };

    let embedding = embedder.embed(generated)?;
    if embedding.len() != centroid.len() {
        return Err(StudyError::Service(format!(
            "generated text embedding has {} dimensions but the store for '{}' has {}",
            embedding.len(),
            store.identity(),
            centroid.len()
        )));
    }

    Ok(Some(cosine_similarity(&embedding, &centroid)))
}

/// Fraction of the generated text's distinct keywords that also occur in the source
#[inline]
pub fn keyword_overlap(source: &str, generated: &str) -> f32 {
    let generated_keywords = keywords(generated);
    if generated_keywords.is_empty() {
        return 0.0;
    }

    let source_keywords = keywords(source);
    let shared = generated_keywords.intersection(&source_keywords).count();
    shared as f32 / generated_keywords.len() as f32
}

/// First integer between 1 and 10 in the reply
#[inline]
pub fn parse_feedback_score(reply: &str) -> Option<u8> {
    reply
        .split(|c: char| !c.is_ascii_digit())
        .filter(|digits| !digits.is_empty())
        .find_map(|digits| digits.parse::<u8>().ok().filter(|n| (1..=10).contains(n)))
}

fn llm_feedback(
    store: &VectorStore,
    generated: &str,
    embedder: &dyn Embedder,
    generator: &dyn TextGenerator,
) -> Result<String> {
    let context = retrieve(generated, store, FEEDBACK_CONTEXT_CHUNKS, embedder)?;
    let prompt = format!(
        "Rate from 1 to 10 how relevant and faithful the generated content is to the source \
         material. Reply with the score first, then one sentence of feedback.\n\n\
         Source material:\n{context}\n\nGenerated content:\n{generated}"
    );
    generator.complete(None, Some(&prompt), Some(FEEDBACK_MAX_TOKENS))
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

fn centroid(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = embeddings.first()?;
    let mut sum = vec![0.0_f32; first.len()];
    for embedding in embeddings {
        for (total, value) in sum.iter_mut().zip(embedding) {
            *total += value;
        }
    }
    let count = embeddings.len() as f32;
    Some(sum.into_iter().map(|total| total / count).collect())
}
