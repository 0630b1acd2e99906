//! Error types for huddle-core

use thiserror::Error;

/// Main error type for huddle-core
///
/// Only the variants raised before any sub-query branch exists are
/// request-fatal. Failures inside a branch are carried as
/// [`BranchFailure`](crate::orchestration::BranchFailure) values instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM API error: {0}")]
    Llm(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Domain definition error: {0}")]
    Domain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Unregistered handler '{name}' (known: {})", known.join(", "))]
    InvalidHandlerReference { name: String, known: Vec<String> },

    #[error("Classifier returned no sub-queries")]
    EmptyDecomposition,

    #[error("Request cancelled")]
    Cancelled,
}

/// Result type alias for huddle-core
pub type Result<T> = std::result::Result<T, Error>;
