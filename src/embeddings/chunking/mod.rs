
use tracing::debug;

use crate::{Result, StudyError};

/// Words per chunk when nothing else is configured
pub const DEFAULT_CHUNK_SIZE: usize = crate::config::settings::DEFAULT_CHUNK_SIZE;

/// Split document text into ordered chunks of `chunk_size` whitespace-delimited words
///
/// Words are rejoined with single spaces. Every chunk holds exactly `chunk_size`
/// words except possibly the last, which holds the remainder. Empty or
/// whitespace-only text yields no chunks.
#[inline]
pub fn chunk_text(text: &str, chunk_size: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(StudyError::InvalidArgument(
            "chunk size must be at least 1".to_string(),
        ));
    }

    let words = text.split_whitespace().collect::<Vec<_>>();
    let chunks = words
        .chunks(chunk_size)
        .map(|group| group.join(" "))
        .collect::<Vec<_>>();

    debug!(
        "Chunked {} words into {} chunks (avg {} tokens)",
        words.len(),
        chunks.len(),
        chunks
            .iter()
            .map(|c| estimate_token_count(c))
            .sum::<usize>()
            / chunks.len().max(1)
    );

    Ok(chunks)
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
