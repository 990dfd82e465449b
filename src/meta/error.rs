//! Meta-analysis Error Types

use thiserror::Error;

/// Errors raised while retrieving or interpreting issue and pull request data
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GraphQL query failed: {0}")]
    GraphQl(String),

    #[error("No API token found in environment variable {0}")]
    MissingToken(String),

    #[error("Invalid repository identity '{0}': expected owner/name or a GitHub URL")]
    InvalidIdentity(String),

    #[error("Repository {0} was not found")]
    NotFound(String),
}

/// Result type for meta-analysis operations
pub type MetaResult<T> = Result<T, MetaError>;
