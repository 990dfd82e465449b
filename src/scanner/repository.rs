//! Repository Snapshot
//!
//! Wraps a working copy of a cloned repository. The snapshot enumerates the
//! commit history reachable from HEAD and can force the working tree to match
//! any commit. The working tree is shared mutable state: a snapshot is owned by
//! exactly one walker, and concurrency across partitions uses separate clones
//! rather than locking a single tree.

use std::path::{Path, PathBuf};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::build::CheckoutBuilder;
use git2::{ErrorCode, Oid, Repository, Sort};
use log::{debug, warn};
use crate::scanner::messages::Commit;
use super::error::{ScanError, ScanResult};

/// Where HEAD pointed when the snapshot was opened
#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginalHead {
    Branch(String),
    Detached(Oid),
}

/// Exclusive handle on a repository working tree
pub struct RepositorySnapshot {
    repo: Repository,
    workdir: PathBuf,
    original_head: Option<OriginalHead>,
    checked_out: Option<String>,
}

impl RepositorySnapshot {
    /// Open a non-bare repository at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .map_err(|e| ScanError::repository(format!("Failed to open repository at {}: {}", path.display(), e.message())))?;

        let workdir = repo.workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| ScanError::repository(format!("Repository at {} has no working tree", path.display())))?;

        let original_head = match repo.head() {
            Ok(head) if head.is_branch() => head.name().map(|name| OriginalHead::Branch(name.to_string())),
            Ok(head) => head.target().map(OriginalHead::Detached),
            Err(e) if e.code() == ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };

        debug!("Opened repository snapshot at {} (head: {:?})", workdir.display(), original_head);

        Ok(Self {
            repo,
            workdir,
            original_head,
            checked_out: None,
        })
    }

    /// Root of the working tree
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Commit currently forced onto the working tree, if any
    pub fn checked_out(&self) -> Option<&str> {
        self.checked_out.as_deref()
    }

    /// Commits reachable from HEAD, most recent first
    pub fn enumerate_history(&self) -> ScanResult<Vec<Commit>> {
        if self.original_head.is_none() {
            return Ok(Vec::new());
        }

        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let mut commits = Vec::new();
        for oid_result in walk {
            let oid = oid_result?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(Commit::new(oid.to_string(), commit_time(commit.time())));
        }

        debug!("Enumerated {} commits from {}", commits.len(), self.workdir.display());
        Ok(commits)
    }

    /// Resolve a commit identifier to a commit record
    pub fn find_commit(&self, id: &str) -> ScanResult<Commit> {
        let oid = Oid::from_str(id)
            .map_err(|e| ScanError::repository(format!("Invalid commit id '{id}': {}", e.message())))?;
        let commit = self.repo.find_commit(oid)
            .map_err(|e| ScanError::repository(format!("Commit {id} not found: {}", e.message())))?;
        Ok(Commit::new(oid.to_string(), commit_time(commit.time())))
    }

    /// Force the working tree to exactly match `commit`
    ///
    /// Uncommitted changes and untracked files are discarded and HEAD is
    /// detached at the commit. The call returns only once every file has been
    /// written, so reads of the tree may start immediately afterwards.
    pub fn checkout(&mut self, commit: &Commit) -> ScanResult<()> {
        let oid = Oid::from_str(&commit.id)
            .map_err(|e| ScanError::checkout(&commit.id, e.message()))?;
        self.force_checkout(oid)
            .map_err(|e| ScanError::checkout(&commit.id, e.message()))?;
        self.checked_out = Some(commit.id.clone());
        Ok(())
    }

    fn force_checkout(&self, oid: Oid) -> Result<(), git2::Error> {
        let target = self.repo.find_commit(oid)?;
        let mut builder = CheckoutBuilder::new();
        builder.force().remove_untracked(true);
        self.repo.checkout_tree(target.as_object(), Some(&mut builder))?;
        self.repo.set_head_detached(oid)
    }

    /// Put HEAD and the working tree back where they were when opened
    pub fn restore(&mut self) -> ScanResult<()> {
        if self.checked_out.is_none() {
            return Ok(());
        }

        match &self.original_head {
            Some(OriginalHead::Branch(name)) => {
                let oid = self.repo.refname_to_id(name)?;
                self.force_checkout(oid)?;
                self.repo.set_head(name)?;
            }
            Some(OriginalHead::Detached(oid)) => {
                self.force_checkout(*oid)?;
            }
            None => {
                warn!("Repository at {} had no HEAD to restore", self.workdir.display());
            }
        }

        self.checked_out = None;
        Ok(())
    }
}

impl Drop for RepositorySnapshot {
    /// A snapshot dropped mid-walk must not leave the clone detached
    fn drop(&mut self) {
        if let Some(commit) = self.checked_out.clone() {
            debug!("Snapshot at {} dropped while at {}, restoring", self.workdir.display(), commit);
            if let Err(e) = self.restore() {
                warn!("Could not restore working tree at {}: {}", self.workdir.display(), e);
            }
        }
    }
}

/// Convert a git timestamp into a timezone-aware instant
pub fn commit_time(time: git2::Time) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or(Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .unwrap_or_default()
        .with_timezone(&offset)
}
