use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Malformed result literal. Recovered locally by [`crate::literal::parse_result`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    #[error("unbalanced '{0}' at offset {1}")]
    Unbalanced(char, usize),
    #[error("expected '{expected}' but found '{found}' at offset {offset}")]
    Mismatched {
        expected: char,
        found: char,
        offset: usize,
    },
    #[error("unexpected token '{0}' at offset {1}")]
    Unexpected(String, usize),
    #[error("mapping entry without ' => ': {0}")]
    MissingArrow(String),
    #[error("not a {0} literal")]
    WrongForm(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum BabelError {
    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },
    /// Displays the interpreter's own diagnostic text unchanged.
    #[error("{stderr}")]
    Process {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("'{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },
    #[error("session {session} did not finish within {after:?}")]
    SentinelTimeout { session: String, after: Duration },
    #[error("evaluation in session {session} was cancelled")]
    Cancelled { session: String },
    /// Displays whatever the interpreter printed before its channel closed.
    #[error("{output}")]
    SessionClosed { session: String, output: String },
    #[error("no such session: {session}")]
    SessionNotFound { session: String },
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<std::io::Error> for BabelError {
    fn from(error: std::io::Error) -> Self {
        BabelError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for BabelError {
    fn from(error: serde_json::Error) -> Self {
        BabelError::Json(error.to_string())
    }
}

impl From<ConfigError> for BabelError {
    fn from(error: ConfigError) -> Self {
        BabelError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BabelError>;
