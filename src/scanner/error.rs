//! Scanner Error Types
//!
//! Error types for history walking, partition dispatch and pipeline orchestration.
//! Per-commit and per-extension failures are absorbed by the walker and the
//! extractor registry; only structural failures reach callers as `ScanError`.

use std::time::Duration;
use thiserror::Error;
use crate::meta::MetaError;
use crate::store::StoreError;

/// Errors that can occur while analysing a repository history
#[derive(Debug, Error)]
pub enum ScanError {
    /// Repository access error
    #[error("Repository error: {0}")]
    Repository(String),

    /// The working tree could not be reset to a commit
    #[error("Checkout of commit {commit} failed: {message}")]
    Checkout { commit: String, message: String },

    /// The working tree could not be grouped by extension
    #[error("File classification failed: {0}")]
    Classification(String),

    /// A worker partition crashed or reported a failure
    #[error("Partition {index} failed: {message}")]
    Partition { index: usize, message: String },

    /// A worker message could not be understood
    #[error("Worker protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration problem: {0}\n\nCheck your configuration file or command line arguments. Run 'gevol --help' for usage information.")]
    Configuration(String),

    /// Cancellation was requested between commits
    #[error("Analysis was cancelled")]
    Cancelled,

    /// The overall pipeline deadline elapsed
    #[error("Analysis did not finish within {}", format_limit(.0))]
    DeadlineExceeded(Duration),

    /// Task spawning or execution error
    #[error("Task error: {0}")]
    Task(String),

    /// Metric storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Issue and pull request retrieval failure
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Wrapped errors from other sources
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Create a repository error with context
    pub fn repository(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let enhanced_msg = if msg.contains("could not find repository") {
            format!("{msg}\n\nMake sure the path points at a cloned git repository.")
        } else if msg.contains("Permission denied") {
            format!("{msg}\n\nCheck that you have read access to the repository directory and files.")
        } else {
            msg
        };
        Self::Repository(enhanced_msg)
    }

    /// Create a checkout error attributed to a commit
    pub fn checkout(commit: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Checkout {
            commit: commit.into(),
            message: msg.into(),
        }
    }

    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    /// Create a partition failure for the worker at `index`
    pub fn partition(index: usize, msg: impl Into<String>) -> Self {
        Self::Partition {
            index,
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// Whether the failure is attributable to a single commit rather than the whole run
    pub fn is_commit_scoped(&self) -> bool {
        matches!(self, Self::Checkout { .. } | Self::Classification(_))
    }
}

fn format_limit(limit: &Duration) -> String {
    if limit.subsec_millis() == 0 {
        format!("{} seconds", limit.as_secs())
    } else {
        format!("{} ms", limit.as_millis())
    }
}

/// Result type for scanning operations
pub type ScanResult<T> = Result<T, ScanError>;

impl From<git2::Error> for ScanError {
    fn from(error: git2::Error) -> Self {
        Self::repository(error.message().to_string())
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for ScanError {
    fn from(error: std::io::Error) -> Self {
        let user_msg = match error.kind() {
            std::io::ErrorKind::NotFound => {
                format!("File or directory not found: {error}")
            }
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied: {error}")
            }
            _ => format!("File system error: {error}"),
        };
        Self::Other(anyhow::anyhow!(user_msg))
    }
}

/// Convert from tokio::task::JoinError
impl From<tokio::task::JoinError> for ScanError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::task(error.to_string())
        }
    }
}
