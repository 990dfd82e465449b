//! Message Structures
//!
//! Commit records, per-commit analysis results and the request/response
//! messages exchanged with worker processes. Everything here is serialisable
//! so a partition can cross a process boundary as JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Metric name -> value
pub type MetricMap = BTreeMap<String, f64>;

/// File extension -> metrics for that extension group
pub type ExtensionMetrics = BTreeMap<String, MetricMap>;

/// A commit as read from the repository history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full hexadecimal object id
    pub id: String,
    /// Committer time with its original offset
    pub timestamp: DateTime<FixedOffset>,
}

impl Commit {
    pub fn new(id: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            id: id.into(),
            timestamp,
        }
    }

    /// Epoch milliseconds, the single numeric time representation used in rows
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Abbreviated id for log output
    pub fn short_id(&self) -> &str {
        if self.id.len() >= 8 { &self.id[..8] } else { &self.id }
    }
}

/// Static analysis outcome for one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub commit_id: String,
    pub commit_date: DateTime<FixedOffset>,
    /// Extension -> metric name -> value; empty when the commit failed
    pub metrics: ExtensionMetrics,
    /// Failure marker for commits whose checkout or classification failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn analyzed(commit: &Commit, metrics: ExtensionMetrics) -> Self {
        Self {
            commit_id: commit.id.clone(),
            commit_date: commit.timestamp,
            metrics,
            error: None,
        }
    }

    /// Placeholder keeping the output aligned one-to-one with the input commits
    pub fn failed(commit: &Commit, error: impl Into<String>) -> Self {
        Self {
            commit_id: commit.id.clone(),
            commit_date: commit.timestamp,
            metrics: ExtensionMetrics::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Classification and extraction settings shipped to every worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub excluded_dirs: Vec<String>,
    pub excluded_extensions: Vec<String>,
    /// Extension -> external analyser command line
    #[serde(default)]
    pub extractor_commands: BTreeMap<String, String>,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout() -> u64 {
    120
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            excluded_dirs: vec![".git".to_string()],
            excluded_extensions: Vec::new(),
            extractor_commands: BTreeMap::new(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Partition assignment sent to a worker on stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub protocol_version: i64,
    pub partition: usize,
    pub clone_path: PathBuf,
    pub commit_ids: Vec<String>,
    pub settings: AnalysisSettings,
}

/// A worker's single reply on stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    Completed {
        partition: usize,
        results: Vec<AnalysisResult>,
    },
    Failed {
        partition: usize,
        message: String,
    },
}

impl WorkerResponse {
    pub fn partition(&self) -> usize {
        match self {
            Self::Completed { partition, .. } | Self::Failed { partition, .. } => *partition,
        }
    }
}
