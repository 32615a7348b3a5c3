//! Quiz data model, extraction of question arrays from model output, and grading.


use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::{Result, StudyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = StudyError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(StudyError::InvalidArgument(format!(
                "unknown difficulty '{other}' (expected easy, medium or hard)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    McqSingle,
    McqMultiple,
    TrueFalse,
    /// Any type label the model invents; the question is still graded by its answer
    #[default]
    #[serde(other)]
    Other,
}

/// A declared or submitted answer: one option, or a set of options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "RawAnswer")]
pub enum Answer {
    Single(String),
    Multiple(Vec<String>),
}

/// Answer shapes accepted on input; JSON booleans become `"True"` / `"False"`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Flag(bool),
    Single(String),
    Multiple(Vec<String>),
}

impl From<RawAnswer> for Answer {
    #[inline]
    fn from(raw: RawAnswer) -> Self {
        match raw {
            RawAnswer::Flag(true) => Self::Single("True".to_string()),
            RawAnswer::Flag(false) => Self::Single("False".to_string()),
            RawAnswer::Single(answer) => Self::Single(answer),
            RawAnswer::Multiple(answers) => Self::Multiple(answers),
        }
    }
}

impl fmt::Display for Answer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(answer) => f.write_str(answer),
            Self::Multiple(answers) => f.write_str(&answers.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    #[serde(rename = "type", default)]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: Answer,
}

/// Question index to declared answer
pub type AnswerKey = BTreeMap<usize, Answer>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizEvaluation {
    pub score: usize,
    pub total: usize,
    /// Per-question feedback, keyed like the answer key
    pub feedback: BTreeMap<usize, String>,
}

/// Slice from the first `[` to the last `]` of loosely formatted model output
#[inline]
pub fn extract_json_array(raw: &str) -> Result<&str> {
    match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if start < end => raw.get(start..=end).ok_or_else(|| {
            StudyError::Parse("bracketed JSON array is not on a character boundary".to_string())
        }),
        _ => Err(StudyError::Parse(
            "no bracketed JSON array found in the response".to_string(),
        )),
    }
}

/// Parse the question array embedded in raw model output
#[inline]
pub fn parse_quiz(raw: &str) -> Result<(Vec<QuizQuestion>, AnswerKey)> {
    let json = extract_json_array(raw)?;
    let questions: Vec<QuizQuestion> = serde_json::from_str(json)
        .map_err(|e| StudyError::Parse(format!("invalid quiz JSON: {e}")))?;

    debug!("Parsed {} quiz questions", questions.len());

    let key = answer_key(&questions);
    Ok((questions, key))
}

#[inline]
pub fn answer_key(questions: &[QuizQuestion]) -> AnswerKey {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| (index, question.answer.clone()))
        .collect()
}

/// Score submitted answers against the key.
///
/// Multi-answer questions compare as sets, everything else by equality. An
/// unanswered question counts as incorrect.
#[inline]
pub fn evaluate_quiz(submitted: &BTreeMap<usize, Answer>, key: &AnswerKey) -> QuizEvaluation {
    let mut score = 0;
    let mut feedback = BTreeMap::new();

    for (&index, correct) in key {
        let given = submitted.get(&index);
        let (is_correct, miss_message) = match correct {
            Answer::Multiple(expected) => (
                given.is_some_and(|given| {
                    as_set(given) == expected.iter().map(String::as_str).collect::<BTreeSet<_>>()
                }),
                format!("Incorrect. Correct answers: {}", expected.join(", ")),
            ),
            Answer::Single(expected) => (
                given == Some(correct),
                format!("Incorrect. Correct answer: {expected}"),
            ),
        };

        if is_correct {
            score += 1;
            feedback.insert(index, "Correct".to_string());
        } else {
            feedback.insert(index, miss_message);
        }
    }

    QuizEvaluation {
        score,
        total: key.len(),
        feedback,
    }
}

fn as_set(answer: &Answer) -> BTreeSet<&str> {
    match answer {
        Answer::Single(answer) => BTreeSet::from([answer.as_str()]),
        Answer::Multiple(answers) => answers.iter().map(String::as_str).collect(),
    }
}
