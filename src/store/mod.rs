//! Metric Storage
//!
//! Persisted metric rows keyed by (repository, commit, extension, metric).
//! Writes have insert-if-absent semantics: the first value written for a key
//! wins and later duplicates are ignored, so repeated or concurrent runs
//! against one repository never duplicate rows.

pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::scanner::selector::LastKnownCommit;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The persisted unit: one metric value for one extension of one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub repo_id: i64,
    pub commit_id: String,
    /// Epoch milliseconds
    pub commit_date: i64,
    pub file_extension: String,
    pub metric: String,
    pub value: f64,
}

impl MetricRow {
    /// Uniqueness key
    pub fn key(&self) -> (i64, &str, &str, &str) {
        (self.repo_id, &self.commit_id, &self.file_extension, &self.metric)
    }
}

/// Storage handle used by the pipeline
pub trait MetricStore: Send + Sync {
    /// Id for `owner/name`, creating the repository record if absent
    fn get_repo_id(&self, owner: &str, name: &str) -> StoreResult<i64>;

    /// Most recent stored commit for the repository
    fn get_last_commit(&self, repo_id: i64) -> StoreResult<Option<LastKnownCommit>>;

    /// Rows with `commit_date <= timestamp`, in insertion order
    fn get_rows_up_to(&self, repo_id: i64, timestamp: i64) -> StoreResult<Vec<MetricRow>>;

    /// Insert rows whose key is not yet stored; returns how many were inserted
    fn insert_rows_if_absent(&self, rows: &[MetricRow]) -> StoreResult<usize>;
}
