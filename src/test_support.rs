// Deterministic stand-ins for the embedding and generation services

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::embeddings::Embedder;
use crate::generation::TextGenerator;
use crate::{Result, StudyError};

pub(crate) const FAKE_EMBED_MODEL: &str = "fake-embed";

/// Embeds known texts to fixed vectors and anything else to letter frequencies
#[derive(Debug, Default)]
pub(crate) struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl FakeEmbedder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of embed or embed_batch invocations
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of individual texts embedded
    pub(crate) fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.vectors.get(text) {
            return vector.clone();
        }

        let mut counts = vec![0.0_f32; 27];
        counts[26] = 1.0;
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            counts[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        counts
    }
}

impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        FAKE_EMBED_MODEL
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StudyError::Service("embedding service unavailable".to_string()));
        }
        self.texts.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(StudyError::Service("embedding service unavailable".to_string()));
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedPrompt {
    pub system: Option<String>,
    pub user: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Returns a canned reply and records every prompt it receives
#[derive(Debug)]
pub(crate) struct FakeGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<RecordedPrompt>>,
}

impl FakeGenerator {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<RecordedPrompt> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

impl TextGenerator for FakeGenerator {
    fn complete(
        &self,
        system: Option<&str>,
        user: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(RecordedPrompt {
                system: system.map(str::to_string),
                user: user.map(str::to_string),
                max_tokens,
            });
        self.reply
            .clone()
            .ok_or_else(|| StudyError::Service("generation service unavailable".to_string()))
    }
}
