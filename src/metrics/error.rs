//! Extractor Error Types

use thiserror::Error;

/// Errors raised by a metric extractor for one extension group
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error while reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Analyser command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("Analyser output could not be parsed: {0}")]
    Parse(String),

    #[error("Analyser command '{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Extraction task failed: {0}")]
    Task(String),
}

impl ExtractError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Task(error.to_string())
    }
}

/// Result type for extractor operations
pub type ExtractResult<T> = Result<T, ExtractError>;
