//! Retrieval-augmented generation of study material.
//!
//! [`StudyAssistant`] ties the pieces together: it loads or builds the
//! document's vector store, retrieves the chunks most relevant to the task,
//! and sends an augmented prompt to the [`TextGenerator`]. The public entry
//! points never fail outright; errors become a readable message (content) or
//! an empty quiz, since callers show the result straight to the user.

#[cfg(test)]
mod tests;

use tracing::{debug, error, info};

use crate::config::{Config, RagConfig};
use crate::embeddings::{Embedder, OllamaClient};
use crate::quiz::{AnswerKey, Difficulty, QuizQuestion, parse_quiz};
use crate::relevance::{RelevanceReport, check_relevance};
use crate::retrieval::retrieve;
use crate::store::{StoreCache, VectorStore};
use crate::{Result, StudyError};

/// System message for free-form content generation
pub const CONTENT_SYSTEM_PROMPT: &str =
    "You are an assistant that generates content based on provided context.";

/// Prefix of every soft failure returned by [`StudyAssistant::generate_content`]
pub const CONTENT_ERROR_PREFIX: &str = "Error generating content: ";

/// The text-generation service boundary
pub trait TextGenerator: Send + Sync {
    /// Complete a conversation of an optional system message and an optional user message
    fn complete(
        &self,
        system: Option<&str>,
        user: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<String>;
}

/// What the student asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudyTask {
    ConceptualExample,
    Summary,
    Contents,
    Custom(String),
}

impl StudyTask {
    #[inline]
    pub fn prompt(&self) -> &str {
        match self {
            Self::ConceptualExample => "Generate a conceptual example based on the content",
            Self::Summary => "Generate a concise summary of the content",
            Self::Contents => "List the key contents or sections in the content",
            Self::Custom(prompt) => prompt,
        }
    }
}

/// Wrap retrieved context around the task prompt
#[inline]
pub fn augmented_prompt(context: &str, prompt: &str) -> String {
    format!("Based on the following relevant content:\n\n{context}\n\n{prompt}")
}

/// Retrieval query used to pick quiz material
#[inline]
pub fn quiz_query(difficulty: Difficulty) -> String {
    format!("Generate quiz questions about the main concepts at {difficulty} difficulty level")
}

/// Instructions asking for a JSON question array grounded in `context`
#[inline]
pub fn quiz_prompt(context: &str, difficulty: Difficulty) -> String {
    format!(
        r#"You are a helpful teaching assistant. Based on the following course material:
{context}

Generate a quiz with the following requirements:
- Difficulty Level: {difficulty}
- Question types:
  - 'easy': MCQ (single correct answer) and True/False questions only.
  - 'medium': Include MCQ (multiple correct answers).
  - 'hard': Generate more complex variations of MCQs and True/False questions.
- Provide correct answers for each question.
- Format questions as JSON in this structure:
  [
    {{
        "question": "Sample question text",
        "type": "mcq_single / mcq_multiple / true_false",
        "options": ["Option1", "Option2", "Option3"],
        "answer": "Correct answer or list of correct answers"
    }}
  ]
- Ensure the generated quiz is in valid JSON format."#
    )
}

pub struct StudyAssistant<E, G> {
    cache: StoreCache,
    embedder: E,
    generator: G,
    rag: RagConfig,
}

impl StudyAssistant<OllamaClient, OllamaClient> {
    /// Assistant backed by the configured Ollama instance and on-disk store cache
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StudyError::Config(e.to_string()))?;
        let client = OllamaClient::new(config)?;
        let cache = StoreCache::from_config(config)?;
        Ok(Self::new(cache, client.clone(), client, config.rag.clone()))
    }
}

impl<E: Embedder, G: TextGenerator> StudyAssistant<E, G> {
    #[inline]
    pub fn new(cache: StoreCache, embedder: E, generator: G, rag: RagConfig) -> Self {
        Self {
            cache,
            embedder,
            generator,
            rag,
        }
    }

    #[inline]
    pub fn cache(&self) -> &StoreCache {
        &self.cache
    }

    #[inline]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[inline]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Load the document's store, building it on first use
    #[inline]
    pub fn vector_store(&self, identity: &str, text: &str) -> Result<VectorStore> {
        self.cache.load_or_build(identity, text, &self.embedder)
    }

    /// Generate content for `prompt` grounded in the document, or a readable error message
    #[inline]
    pub fn generate_content(&self, prompt: &str, identity: &str, text: &str) -> String {
        self.try_generate_content(prompt, identity, text)
            .unwrap_or_else(|e| {
                error!("Content generation for '{}' failed: {}", identity, e);
                format!("{CONTENT_ERROR_PREFIX}{e}")
            })
    }

    #[inline]
    pub fn generate_task(&self, task: &StudyTask, identity: &str, text: &str) -> String {
        self.generate_content(task.prompt(), identity, text)
    }

    #[inline]
    pub fn try_generate_content(&self, prompt: &str, identity: &str, text: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(StudyError::InvalidArgument(
                "prompt cannot be empty".to_string(),
            ));
        }

        let store = self.vector_store(identity, text)?;
        let context = retrieve(prompt, &store, self.rag.content_top_k, &self.embedder)?;
        let enhanced = augmented_prompt(&context, prompt);

        info!(
            "Generating content for '{}' with {} bytes of context",
            identity,
            context.len()
        );

        self.generator.complete(
            Some(CONTENT_SYSTEM_PROMPT),
            Some(&enhanced),
            Some(self.rag.max_tokens),
        )
    }

    /// Generate a quiz; any failure yields an empty question list and answer key
    #[inline]
    pub fn generate_quiz(
        &self,
        identity: &str,
        text: &str,
        difficulty: Difficulty,
    ) -> (Vec<QuizQuestion>, AnswerKey) {
        self.try_generate_quiz(identity, text, difficulty)
            .unwrap_or_else(|e| {
                error!("Quiz generation for '{}' failed: {}", identity, e);
                (Vec::new(), AnswerKey::new())
            })
    }

    #[inline]
    pub fn try_generate_quiz(
        &self,
        identity: &str,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<(Vec<QuizQuestion>, AnswerKey)> {
        let store = self.vector_store(identity, text)?;
        let context = retrieve(
            &quiz_query(difficulty),
            &store,
            self.rag.quiz_top_k,
            &self.embedder,
        )?;

        info!("Generating {} quiz for '{}'", difficulty, identity);

        let raw = self
            .generator
            .complete(Some(&quiz_prompt(&context, difficulty)), None, None)?;
        debug!("Quiz response of {} bytes", raw.len());

        parse_quiz(&raw)
    }

    /// Score how well `generated` stays on the document's material
    #[inline]
    pub fn check_relevance(&self, identity: &str, text: &str, generated: &str) -> RelevanceReport {
        match self.vector_store(identity, text) {
            Ok(store) => check_relevance(&store, text, generated, &self.embedder, &self.generator),
            Err(e) => {
                error!("Relevance check for '{}' could not load store: {}", identity, e);
                RelevanceReport::unscored(text, generated)
            }
        }
    }
}
