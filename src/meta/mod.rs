//! Meta-analysis
//!
//! Metrics derived from issue and pull request activity rather than file
//! content. Events come from a `MetaSource` (GitHub in production) and are
//! aligned onto commit timestamps as running counts.

pub mod error;
pub mod aligner;
pub mod analyzer;
pub mod github;

use std::fmt;
use std::str::FromStr;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{MetaError, MetaResult};
pub use aligner::{align, MetaAligner, StateCounts};
pub use analyzer::{MetaAnalyzer, MetaMetrics};
pub use github::GithubMetaSource;

pub const ISSUES: &str = "issues";
pub const OPEN_ISSUES: &str = "openIssues";
pub const CLOSED_ISSUES: &str = "closedIssues";
pub const PULL_REQUESTS: &str = "pullRequests";
pub const OPEN_PULL_REQUESTS: &str = "openPullRequests";
pub const CLOSED_PULL_REQUESTS: &str = "closedPullRequests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Issue,
    PullRequest,
}

/// Current state of an issue or pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventState {
    Open,
    Closed,
    Merged,
}

impl EventState {
    /// Merged pull requests count as closed
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl FromStr for EventState {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "MERGED" => Ok(Self::Merged),
            other => Err(MetaError::GraphQl(format!("unknown state '{other}'"))),
        }
    }
}

/// One issue or pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvent {
    pub number: u64,
    pub kind: EventKind,
    pub state: EventState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl IssueEvent {
    pub fn created_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

/// GitHub repository coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub owner: String,
    pub name: String,
}

impl RepoIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Accepts `owner/name`, `https://github.com/owner/name(.git)` and
    /// `git@github.com:owner/name(.git)`
    pub fn parse(input: &str) -> MetaResult<Self> {
        let trimmed = input.trim().trim_end_matches('/');
        let path = if let Some(rest) = trimmed.strip_prefix("git@") {
            rest.split_once(':').map(|(_, path)| path)
        } else if let Some((_, rest)) = trimmed.split_once("://") {
            rest.split_once('/').map(|(_, path)| path)
        } else {
            Some(trimmed)
        };

        let path = path
            .map(|p| p.trim_end_matches(".git"))
            .ok_or_else(|| MetaError::InvalidIdentity(input.to_string()))?;

        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c));
        match path.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if valid(*owner) && valid(*name) => Ok(Self::new(*owner, *name)),
            _ => Err(MetaError::InvalidIdentity(input.to_string())),
        }
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoIdentity {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Provider of a repository's issues and pull requests
#[async_trait]
pub trait MetaSource: Send + Sync {
    fn name(&self) -> &str;

    /// Every issue and pull request of `repo`, in any order
    async fn fetch_events(&self, repo: &RepoIdentity) -> MetaResult<Vec<IssueEvent>>;
}
