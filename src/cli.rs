//! Command-line argument parsing for chinook-ask.
//!
//! Uses clap to parse CLI arguments. Flags override the config file and the
//! `CHINOOK_*` environment variables.

use crate::config::Config;
use crate::error::{AskError, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Ask natural-language questions about the Chinook music store.
#[derive(Parser, Debug)]
#[command(name = "chinook-ask")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Question to answer (reads questions from stdin when omitted)
    #[arg(value_name = "QUESTION", conflicts_with = "file")]
    pub question: Option<String>,

    /// SQLite store file
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// File copied to the store path when the store is missing
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// LLM provider to use (openai, groq, mock)
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Model name for the provider
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// File with one question per line; blank lines and `#` comments are skipped
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Questions answered at once in --file mode
    #[arg(long, value_name = "N", default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Exit when the store schema differs from the embedded description
    #[arg(long)]
    pub strict_schema: bool,

    /// Print one JSON object per question
    #[arg(long)]
    pub json: bool,

    /// Log the session state snapshot after each question
    #[arg(long)]
    pub debug_state: bool,

    /// Write logs to the state directory instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

/// Where questions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    /// One question from the command line.
    Single(String),
    /// Questions from a file, answered concurrently.
    File(PathBuf),
    /// Questions from stdin, answered one at a time.
    Stdin,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies flag values over the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(db) = &self.db {
            config.store.path = db.clone();
        }
        if let Some(source) = &self.source {
            config.store.source = Some(source.clone());
        }
        if let Some(llm) = &self.llm {
            config.llm.provider = llm.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = Some(model.clone());
        }
        if self.strict_schema {
            config.store.strict_schema = true;
        }
    }

    /// Determines the input mode, rejecting an empty question.
    pub fn input_mode(&self) -> Result<InputMode> {
        if let Some(question) = &self.question {
            let question = normalize_question(question)
                .ok_or_else(|| AskError::config("The question must not be empty"))?;
            return Ok(InputMode::Single(question));
        }

        if let Some(file) = &self.file {
            return Ok(InputMode::File(file.clone()));
        }

        Ok(InputMode::Stdin)
    }
}

/// Trims a question, returning `None` when nothing is left.
pub fn normalize_question(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extracts questions from file contents, one per line.
pub fn parse_questions(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(normalize_question)
        .collect()
}

/// Reads a question file.
pub fn read_question_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AskError::config(format!(
            "Failed to read question file {}: {e}",
            path.display()
        ))
    })?;
    Ok(parse_questions(&content))
}
