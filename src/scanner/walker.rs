//! Commit Walker
//!
//! Drives a single repository snapshot through a fixed, pre-ordered sequence
//! of commits. Each commit moves `Pending -> CheckedOut -> Analyzed`, or ends
//! in `Failed` when its checkout or classification fails. Checkout of the next
//! commit starts only after the previous commit's extraction has finished, so
//! file reads never observe a half-written tree.
//!
//! Checkout and classification are blocking git and file system work and run
//! on the blocking pool. Cancellation and the run deadline are only observed
//! between commits.
//!
//! The output is always one `AnalysisResult` per input commit, in input order.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use crate::metrics::ExtractorRegistry;
use crate::scanner::filters::{FileClassifier, FileGroup};
use crate::scanner::messages::{AnalysisResult, Commit};
use crate::scanner::repository::RepositorySnapshot;
use super::error::{ScanError, ScanResult};

/// Per-commit processing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    CheckedOut,
    Analyzed,
    Failed(String),
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Analyzed | Self::Failed(_))
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::CheckedOut => write!(f, "checked out"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Counts of terminal states after a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub analyzed: usize,
    pub failed: usize,
}

impl WalkSummary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let failed = results.iter().filter(|r| r.is_failed()).count();
        Self {
            analyzed: results.len() - failed,
            failed,
        }
    }
}

/// Wall-clock bound on one run, started when the run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn start(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn is_past(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn exceeded(&self) -> ScanError {
        ScanError::DeadlineExceeded(self.limit)
    }
}

/// Sequential checkout-then-analyse loop over one snapshot
pub struct CommitWalker {
    snapshot: Arc<Mutex<RepositorySnapshot>>,
    classifier: Arc<FileClassifier>,
    registry: Arc<ExtractorRegistry>,
    cancel: Option<CancellationToken>,
    deadline: Option<Deadline>,
}

impl CommitWalker {
    pub fn new(snapshot: RepositorySnapshot, classifier: FileClassifier, registry: Arc<ExtractorRegistry>) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
            classifier: Arc::new(classifier),
            registry,
            cancel: None,
            deadline: None,
        }
    }

    /// Check `token` between commits; a checkout/analysis pair is never interrupted
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stop with `DeadlineExceeded` at the first commit boundary past `deadline`
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Commit currently forced onto the working tree, if any
    pub fn checked_out(&self) -> Option<String> {
        self.snapshot.lock().checked_out().map(str::to_string)
    }

    /// Analyse `commits` in order, restoring the original HEAD afterwards
    pub async fn walk(&mut self, commits: &[Commit]) -> ScanResult<Vec<AnalysisResult>> {
        let total = commits.len();
        let mut results = Vec::with_capacity(total);

        for (index, commit) in commits.iter().enumerate() {
            if let Err(e) = self.check_boundary(index, total) {
                self.restore_quietly();
                return Err(e);
            }

            info!("[{}/{}] Analysing commit {} ({})", index + 1, total, commit.short_id(), commit.timestamp);
            let (state, result) = match self.step(commit).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.restore_quietly();
                    return Err(e);
                }
            };
            debug!("[{}/{}] {} {}", index + 1, total, commit.short_id(), state);
            results.push(result);
        }

        self.restore_quietly();

        let summary = WalkSummary::from_results(&results);
        if summary.failed > 0 {
            warn!("{} of {} commits could not be analysed", summary.failed, total);
        }
        Ok(results)
    }

    /// Resolve identifiers against this snapshot and walk them
    pub async fn walk_ids(&mut self, ids: &[String]) -> ScanResult<Vec<AnalysisResult>> {
        let commits = {
            let snapshot = self.snapshot.lock();
            ids.iter()
                .map(|id| snapshot.find_commit(id))
                .collect::<ScanResult<Vec<_>>>()?
        };
        self.walk(&commits).await
    }

    fn check_boundary(&self, index: usize, total: usize) -> ScanResult<()> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            info!("Cancelled after {}/{} commits", index, total);
            return Err(ScanError::Cancelled);
        }
        if let Some(deadline) = self.deadline.filter(Deadline::is_past) {
            info!("Deadline reached after {}/{} commits", index, total);
            return Err(deadline.exceeded());
        }
        Ok(())
    }

    /// Move one commit to a terminal state; only run-level failures are errors
    async fn step(&mut self, commit: &Commit) -> ScanResult<(CommitState, AnalysisResult)> {
        trace!("{}: {}", commit.short_id(), CommitState::Pending);

        let groups = match self.prepare(commit).await {
            Ok(groups) => groups,
            Err(e) if e.is_commit_scoped() => {
                warn!("Commit {}: {}", commit.short_id(), e);
                return Ok((CommitState::Failed(e.to_string()), AnalysisResult::failed(commit, e.to_string())));
            }
            Err(e) => return Err(e),
        };

        let metrics = self.registry.analyze_group(&groups).await;
        Ok((CommitState::Analyzed, AnalysisResult::analyzed(commit, metrics)))
    }

    /// Checkout and classify on the blocking pool
    async fn prepare(&self, commit: &Commit) -> ScanResult<FileGroup> {
        let snapshot = Arc::clone(&self.snapshot);
        let classifier = Arc::clone(&self.classifier);
        let commit = commit.clone();

        tokio::task::spawn_blocking(move || {
            let mut snapshot = snapshot.lock();
            snapshot.checkout(&commit)?;
            trace!("{}: {}", commit.short_id(), CommitState::CheckedOut);
            classifier.classify(snapshot.workdir())
        })
        .await?
    }

    fn restore_quietly(&mut self) {
        let mut snapshot = self.snapshot.lock();
        if let Err(e) = snapshot.restore() {
            warn!("Could not restore working tree at {}: {}", snapshot.workdir().display(), e);
        }
    }
}
