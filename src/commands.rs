use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::document::load_document;
use crate::embeddings::OllamaClient;
use crate::generation::{StudyAssistant, StudyTask};
use crate::quiz::{Answer, Difficulty, evaluate_quiz};
use crate::store::StoreCache;

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Build (or confirm) the vector store for a lecture file
#[inline]
pub fn index_document(config: &Config, path: &Path, identity: Option<String>) -> Result<()> {
    let document = load_document(path, identity)?;
    let assistant = StudyAssistant::from_config(config).context("Failed to set up assistant")?;

    let cached = assistant.cache().contains(&document.identity)?;
    let bar = spinner(&format!("Embedding {}", document.identity));
    let store = assistant.vector_store(&document.identity, &document.text);
    bar.finish_and_clear();
    let store = store.context("Failed to build vector store")?;

    info!("Indexed '{}'", document.identity);
    println!(
        "{} {} ({} chunks, model {})",
        if cached {
            style("Already indexed:").yellow()
        } else {
            style("Indexed:").green()
        },
        document.identity,
        store.len(),
        store.model()
    );
    println!(
        "   Record: {}",
        assistant.cache().record_path(&document.identity)?.display()
    );

    Ok(())
}

/// Generate study content for a lecture and optionally score its relevance
#[inline]
pub fn generate(
    config: &Config,
    path: &Path,
    identity: Option<String>,
    task: &StudyTask,
    check_relevance: bool,
) -> Result<()> {
    let document = load_document(path, identity)?;
    let assistant = StudyAssistant::from_config(config).context("Failed to set up assistant")?;

    let bar = spinner("Generating");
    let content = assistant.generate_task(task, &document.identity, &document.text);
    bar.finish_and_clear();

    println!("{content}");

    if check_relevance {
        let bar = spinner("Checking relevance");
        let report = assistant.check_relevance(&document.identity, &document.text, &content);
        bar.finish_and_clear();

        println!();
        println!("{}", style("Relevance Check Summary:").bold().green());
        match report.semantic_similarity {
            Some(similarity) => println!("   Semantic Similarity: {similarity:.2}"),
            None => println!("   Semantic Similarity: N/A"),
        }
        println!(
            "   Keyword Overlap: {:.2}%",
            report.keyword_overlap * 100.0
        );
        match report.feedback_score {
            Some(score) => println!("   LLM Feedback Score: {score}/10"),
            None => println!("   LLM Feedback Score: N/A"),
        }
        if let Some(feedback) = report.feedback {
            println!("   Feedback: {}", style(feedback).dim());
        }
    }

    Ok(())
}

/// Generate a quiz; with `answers` (a JSON object of index to answer) grade it instead of revealing the key
#[inline]
pub fn quiz(
    config: &Config,
    path: &Path,
    identity: Option<String>,
    difficulty: Difficulty,
    answers: Option<&str>,
) -> Result<()> {
    let submitted: Option<BTreeMap<usize, Answer>> = answers
        .map(serde_json::from_str)
        .transpose()
        .context("Answers must be a JSON object like {\"0\": \"True\", \"1\": [\"A\", \"C\"]}")?;

    let document = load_document(path, identity)?;
    let assistant = StudyAssistant::from_config(config).context("Failed to set up assistant")?;

    let bar = spinner(&format!("Generating {difficulty} quiz"));
    let (questions, key) = assistant.generate_quiz(&document.identity, &document.text, difficulty);
    bar.finish_and_clear();

    if questions.is_empty() {
        println!(
            "{}",
            style("No quiz could be generated. Please try again.").yellow()
        );
        return Ok(());
    }

    for (index, question) in questions.iter().enumerate() {
        println!("{}. {}", index + 1, style(&question.question).bold());
        for option in &question.options {
            println!("   - {option}");
        }
    }

    println!();
    match submitted {
        Some(submitted) => {
            let evaluation = evaluate_quiz(&submitted, &key);
            println!(
                "{}",
                style(format!(
                    "Score: {}/{}",
                    evaluation.score, evaluation.total
                ))
                .bold()
                .cyan()
            );
            for (index, feedback) in &evaluation.feedback {
                println!("   {}. {}", index + 1, feedback);
            }
        }
        None => {
            println!("{}", style("Answer key:").bold());
            for (index, answer) in &key {
                println!("   {}. {}", index + 1, answer);
            }
        }
    }

    Ok(())
}

/// Show configuration, service health and cached stores
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    println!("📊 Lecture RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   📋 Generation Model: {}", config.ollama.generation_model);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {}", e),
        },
        Err(e) => println!("   ❌ Ollama: Failed to configure client - {}", e),
    }

    println!();
    println!("🔍 Vector Stores:");
    let cache = StoreCache::from_config(config).context("Failed to open vector store cache")?;
    println!("   Directory: {}", cache.store_dir().display());

    let records = cache.records()?;
    if records.is_empty() {
        println!("   No lectures indexed yet.");
        println!("   Use 'lecture-rag index <file>' to index one.");
    }

    for (path, record) in records {
        match record {
            Ok(store) => {
                println!("   📚 {}", store.identity());
                println!(
                    "      {} chunks, model {}, built {}",
                    store.len(),
                    store.model(),
                    store.created_at().format("%Y-%m-%d %H:%M UTC")
                );
            }
            Err(e) => println!("   ❌ {}: {}", path.display(), e),
        }
    }

    Ok(())
}
