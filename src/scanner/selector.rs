//! Incremental Commit Selection
//!
//! Chooses the commits that are newer than the last commit already stored for
//! a repository. The comparison is by commit timestamp alone: rewritten or
//! backdated history can make it skip or repeat commits. Repeated commits are
//! harmless because storage inserts only absent rows.

use log::{debug, warn};
use crate::scanner::messages::Commit;

/// Last analysed commit as recorded in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastKnownCommit {
    pub id: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl From<&Commit> for LastKnownCommit {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.clone(),
            timestamp: commit.timestamp_millis(),
        }
    }
}

/// Commits newer than `last_known`, oldest first
///
/// `newest_first` is the history as enumerated from HEAD. With no previous
/// analysis every commit is new.
pub fn select_new_commits(newest_first: &[Commit], last_known: Option<&LastKnownCommit>) -> Vec<Commit> {
    let mut selected: Vec<Commit> = match last_known {
        None => newest_first.to_vec(),
        Some(last) => {
            if !newest_first.iter().any(|c| c.id == last.id) {
                warn!(
                    "Last analysed commit {} is no longer in history; selecting by timestamp only",
                    last.id
                );
            }
            newest_first
                .iter()
                .filter(|c| c.timestamp_millis() > last.timestamp)
                .cloned()
                .collect()
        }
    };

    // Chronological regardless of input order; ties keep ancestry order
    selected.reverse();
    selected.sort_by_key(Commit::timestamp_millis);

    debug!("Selected {} of {} commits for analysis", selected.len(), newest_first.len());
    selected
}
