use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use lecture_rag::{Result, StudyError};
use lecture_rag::commands::{generate, index_document, quiz, show_status};
use lecture_rag::config::{Config, run_interactive_config, show_config};
use lecture_rag::generation::StudyTask;
use lecture_rag::quiz::Difficulty;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lecture-rag")]
#[command(about = "Study assistant that generates content and quizzes from lecture files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Task {
    /// A conceptual example based on the lecture
    Example,
    /// A concise summary
    Summary,
    /// The key contents or sections
    Contents,
}

impl From<Task> for StudyTask {
    fn from(task: Task) -> Self {
        match task {
            Task::Example => Self::ConceptualExample,
            Task::Summary => Self::Summary,
            Task::Contents => Self::Contents,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk and embed a lecture file into the vector store cache
    Index {
        /// Lecture file (PDF or plain text)
        file: PathBuf,
        /// Cache identity for the document; defaults to the file path
        #[arg(long)]
        identity: Option<String>,
    },
    /// Generate study content grounded in a lecture
    #[command(group(ArgGroup::new("request").required(true).args(["task", "prompt"])))]
    Generate {
        /// Lecture file (PDF or plain text)
        file: PathBuf,
        /// Preset study task
        #[arg(long, value_enum)]
        task: Option<Task>,
        /// Free-form request
        #[arg(long)]
        prompt: Option<String>,
        /// Cache identity for the document; defaults to the file path
        #[arg(long)]
        identity: Option<String>,
        /// Score how well the output matches the lecture
        #[arg(long)]
        check_relevance: bool,
    },
    /// Generate a quiz, or grade answers to one
    Quiz {
        /// Lecture file (PDF or plain text)
        file: PathBuf,
        /// Quiz difficulty
        #[arg(long, value_enum, ignore_case = true, default_value_t = Difficulty::Medium)]
        difficulty: Difficulty,
        /// JSON object mapping question index to answer, e.g. '{"0": "True"}'
        #[arg(long)]
        answers: Option<String>,
        /// Cache identity for the document; defaults to the file path
        #[arg(long)]
        identity: Option<String>,
    },
    /// Show configuration, Ollama health and indexed lectures
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { file, identity } => {
            index_document(&Config::load_default()?, &file, identity)?;
        }
        Commands::Generate {
            file,
            task,
            prompt,
            identity,
            check_relevance,
        } => {
            let task = match (task, prompt) {
                (_, Some(prompt)) => StudyTask::Custom(prompt),
                (Some(task), None) => task.into(),
                (None, None) => {
                    return Err(StudyError::InvalidArgument(
                        "either --task or --prompt is required".to_string(),
                    ));
                }
            };
            generate(
                &Config::load_default()?,
                &file,
                identity,
                &task,
                check_relevance,
            )?;
        }
        Commands::Quiz {
            file,
            difficulty,
            answers,
            identity,
        } => {
            quiz(
                &Config::load_default()?,
                &file,
                identity,
                difficulty,
                answers.as_deref(),
            )?;
        }
        Commands::Status => {
            show_status(&Config::load_default()?)?;
        }
    }

    Ok(())
}
