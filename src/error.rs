//! Error types for chinook-ask.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for chinook-ask operations.
#[derive(Error, Debug)]
pub enum AskError {
    /// Store access errors (cannot open the database file, connection dropped, etc.)
    #[error("Store error: {0}")]
    Store(String),

    /// Query execution errors (syntax errors, unknown columns, rejected statements, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store file is missing and could not be provisioned.
    #[error("Provisioning error: {0}")]
    Provision(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AskError {
    /// Creates a store error with the given message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a provisioning error with the given message.
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Store(_) => "Store Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Provision(_) => "Provisioning Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the bare message without the category prefix.
    ///
    /// Used where the raw store text must reach the user unchanged.
    pub fn detail(&self) -> &str {
        match self {
            Self::Store(msg)
            | Self::Query(msg)
            | Self::Llm(msg)
            | Self::Config(msg)
            | Self::Provision(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using AskError.
pub type Result<T> = std::result::Result<T, AskError>;
