use super::*;
use crate::config::RagConfig;
use crate::quiz::{Answer, QuestionType};
use crate::test_support::{FakeEmbedder, FakeGenerator};
use tempfile::TempDir;

const LECTURE: &str = "Sorting algorithms arrange elements in order. Merge sort divides the input \
                       into halves and merges sorted halves. Quick sort partitions around a pivot. \
                       Heap sort builds a binary heap. Insertion sort is efficient for small inputs. \
                       Stable sorts keep equal keys in their original order.";

const QUIZ_REPLY: &str = r#"Sure! Here is the quiz:
[
  {"question": "Merge sort is stable.", "type": "true_false", "options": ["True", "False"], "answer": "True"},
  {"question": "Which sorts are comparison sorts?", "type": "mcq_multiple", "options": ["Merge", "Heap", "Counting"], "answer": ["Merge", "Heap"]}
]
Let me know if you need more."#;

fn assistant(
    embedder: FakeEmbedder,
    generator: FakeGenerator,
) -> (StudyAssistant<FakeEmbedder, FakeGenerator>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let cache = StoreCache::new(temp_dir.path(), 6).expect("cache created");
    (
        StudyAssistant::new(cache, embedder, generator, RagConfig::default()),
        temp_dir,
    )
}

#[test]
fn task_prompts() {
    assert_eq!(
        StudyTask::Summary.prompt(),
        "Generate a concise summary of the content"
    );
    assert_eq!(
        StudyTask::ConceptualExample.prompt(),
        "Generate a conceptual example based on the content"
    );
    assert_eq!(
        StudyTask::Contents.prompt(),
        "List the key contents or sections in the content"
    );
    assert_eq!(StudyTask::Custom("Why?".to_string()).prompt(), "Why?");
}

#[test]
fn augmented_prompt_layout() {
    assert_eq!(
        augmented_prompt("ctx one\n\nctx two", "Summarize"),
        "Based on the following relevant content:\n\nctx one\n\nctx two\n\nSummarize"
    );
}

#[test]
fn quiz_prompt_mentions_difficulty_and_context() {
    let prompt = quiz_prompt("heaps and stacks", Difficulty::Hard);
    assert!(prompt.contains("heaps and stacks"));
    assert!(prompt.contains("- Difficulty Level: hard"));
    assert!(prompt.contains(r#""type": "mcq_single / mcq_multiple / true_false""#));
    assert_eq!(
        quiz_query(Difficulty::Easy),
        "Generate quiz questions about the main concepts at easy difficulty level"
    );
}

#[test]
fn generate_content_sends_augmented_prompt() {
    let (assistant, _temp_dir) =
        assistant(FakeEmbedder::new(), FakeGenerator::replying("A merge sort example."));

    let reply = assistant.generate_task(&StudyTask::ConceptualExample, "sorting.pdf", LECTURE);

    assert_eq!(reply, "A merge sort example.");

    let prompts = assistant.generator().prompts();
    assert_eq!(prompts.len(), 1);
    let sent = &prompts[0];
    assert_eq!(sent.system.as_deref(), Some(CONTENT_SYSTEM_PROMPT));
    assert_eq!(sent.max_tokens, Some(500));
    let user = sent.user.as_deref().expect("content prompt is the user message");
    assert!(user.starts_with("Based on the following relevant content:\n\n"));
    assert!(user.ends_with("\n\nGenerate a conceptual example based on the content"));
    // header, two separators between three chunks, and the gap before the prompt
    assert_eq!(user.matches("\n\n").count(), 4);
}

#[test]
fn repeated_generation_reuses_the_store() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::replying("ok"));
    let chunk_count = crate::embeddings::chunk_text(LECTURE, 6)
        .expect("chunking")
        .len();

    assistant.generate_content("What is a pivot?", "sorting.pdf", LECTURE);
    assert_eq!(assistant.embedder().texts_embedded(), chunk_count + 1);

    assistant.generate_content("What is a heap?", "sorting.pdf", LECTURE);
    assert_eq!(assistant.embedder().texts_embedded(), chunk_count + 2);
    assert!(assistant.cache().contains("sorting.pdf").expect("contains"));
}

#[test]
fn generation_failure_becomes_message() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::failing());

    let reply = assistant.generate_content("Explain quick sort", "sorting.pdf", LECTURE);

    assert!(reply.starts_with(CONTENT_ERROR_PREFIX), "got {reply}");
    assert!(reply.contains("generation service unavailable"));
}

#[test]
fn embedding_failure_becomes_message() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::failing(), FakeGenerator::replying("ok"));

    let reply = assistant.generate_content("Explain quick sort", "sorting.pdf", LECTURE);

    assert!(reply.starts_with(CONTENT_ERROR_PREFIX));
    assert!(assistant.generator().prompts().is_empty());
}

#[test]
fn blank_prompt_is_rejected() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::replying("ok"));

    assert!(matches!(
        assistant.try_generate_content("  ", "sorting.pdf", LECTURE),
        Err(StudyError::InvalidArgument(_))
    ));
    assert!(
        assistant
            .generate_task(&StudyTask::Custom(String::new()), "sorting.pdf", LECTURE)
            .starts_with(CONTENT_ERROR_PREFIX)
    );
}

#[test]
fn quiz_is_parsed_from_reply() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::replying(QUIZ_REPLY));

    let (questions, key) = assistant.generate_quiz("sorting.pdf", LECTURE, Difficulty::Medium);

    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].kind, QuestionType::TrueFalse);
    assert_eq!(key[&0], Answer::Single("True".to_string()));
    assert_eq!(
        key[&1],
        Answer::Multiple(vec!["Merge".to_string(), "Heap".to_string()])
    );

    let prompts = assistant.generator().prompts();
    let sent = &prompts[0];
    assert_eq!(sent.user, None);
    assert_eq!(sent.max_tokens, None);
    let system = sent.system.as_deref().expect("quiz prompt is the system message");
    assert!(system.contains("- Difficulty Level: medium"));
    assert!(system.starts_with("You are a helpful teaching assistant."));
}

#[test]
fn quiz_without_json_is_empty() {
    let (assistant, _temp_dir) = assistant(
        FakeEmbedder::new(),
        FakeGenerator::replying("I cannot produce a quiz today."),
    );

    let (questions, key) = assistant.generate_quiz("sorting.pdf", LECTURE, Difficulty::Easy);

    assert!(questions.is_empty());
    assert!(key.is_empty());
}

#[test]
fn quiz_service_failure_is_empty() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::failing());

    let (questions, key) = assistant.generate_quiz("sorting.pdf", LECTURE, Difficulty::Hard);

    assert!(questions.is_empty());
    assert!(key.is_empty());
    assert!(matches!(
        assistant.try_generate_quiz("sorting.pdf", LECTURE, Difficulty::Hard),
        Err(StudyError::Service(_))
    ));
}

#[test]
fn relevance_falls_back_when_store_is_corrupt() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::replying("7"));
    let path = assistant
        .cache()
        .record_path("sorting.pdf")
        .expect("path derived");
    std::fs::write(path, "corrupt").expect("write corrupt record");

    let report = assistant.check_relevance("sorting.pdf", LECTURE, "Merge sort merges halves.");

    assert_eq!(report.semantic_similarity, None);
    assert_eq!(report.feedback_score, None);
    assert!(report.keyword_overlap > 0.0);
    assert!(assistant.generator().prompts().is_empty());
}

#[test]
fn relevance_report_uses_generator_score() {
    let (assistant, _temp_dir) = assistant(FakeEmbedder::new(), FakeGenerator::replying("7/10"));

    let report = assistant.check_relevance("sorting.pdf", LECTURE, "Merge sort merges halves.");

    assert_eq!(report.feedback_score, Some(7));
    assert!(report.semantic_similarity.is_some());
}
