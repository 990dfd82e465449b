//! Analysis Pipeline
//!
//! One incremental run for one repository:
//!
//! ```text
//! store.last_commit ─► select_new_commits ─┬─► CommitWalker | ParallelDispatcher ─┐
//!                                          └─► MetaAnalyzer ──────────────────────┤
//! store.rows_up_to(last) ──────────────────────────────────────────► assemble + merge ─► points
//! ```
//!
//! Static analysis and meta-analysis run concurrently; they touch the file
//! system and the network respectively and meet only in the assembler.
//!
//! The deadline never interrupts a checkout in the user's clone: the walker
//! observes it between commits, while the meta fetch and the worker fan-out
//! (which only touch private clones) are abandoned as soon as it passes.

pub mod assembler;
pub mod point;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use crate::meta::{MetaAnalyzer, MetaSource, RepoIdentity};
use crate::metrics::ExtractorRegistry;
use crate::scanner::config::AnalysisConfig;
use crate::scanner::dispatcher::{ParallelDispatcher, PartitionRunner};
use crate::scanner::error::{ScanError, ScanResult};
use crate::scanner::filters::FileClassifier;
use crate::scanner::messages::{AnalysisResult, Commit};
use crate::scanner::repository::RepositorySnapshot;
use crate::scanner::selector::select_new_commits;
use crate::scanner::walker::{CommitWalker, Deadline, WalkSummary};
use crate::store::MetricStore;

pub use assembler::{assemble, merge_rows, NO_EXTENSION};
pub use point::{pivot, Point};

/// What to analyse
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// `owner/name` or a GitHub URL
    pub repository: String,
    /// Existing working clone of the repository
    pub path: PathBuf,
    pub cancel: Option<CancellationToken>,
}

impl AnalysisRequest {
    pub fn new(repository: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            path: path.into(),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub repo_id: i64,
    pub repository: String,
    /// Commits selected as new this run
    pub selected: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub parallel: bool,
    pub inserted_rows: usize,
    /// Old-then-new pivoted output
    pub points: Vec<Point>,
}

pub struct Pipeline {
    config: AnalysisConfig,
    store: Arc<dyn MetricStore>,
    registry: Arc<ExtractorRegistry>,
    runner: Arc<dyn PartitionRunner>,
    meta_source: Option<Arc<dyn MetaSource>>,
}

impl Pipeline {
    pub fn new(
        config: AnalysisConfig,
        store: Arc<dyn MetricStore>,
        runner: Arc<dyn PartitionRunner>,
        meta_source: Option<Arc<dyn MetaSource>>,
    ) -> ScanResult<Self> {
        config.validate().map_err(|e| ScanError::configuration(e.to_string()))?;
        let registry = ExtractorRegistry::from_settings(&config.settings)
            .map_err(|e| ScanError::configuration(e.to_string()))?;

        Ok(Self {
            config,
            store,
            registry: Arc::new(registry),
            runner,
            meta_source,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the whole pipeline, bounded by the configured deadline
    pub async fn run(&self, request: AnalysisRequest) -> ScanResult<AnalysisReport> {
        let identity = RepoIdentity::parse(&request.repository)
            .map_err(|e| ScanError::configuration(e.to_string()))?;
        if !request.path.is_dir() {
            return Err(ScanError::configuration(format!(
                "Repository path {} is not a directory",
                request.path.display()
            )));
        }

        let deadline = self.config.deadline.map(Deadline::start);
        self.execute(identity, request, deadline).await
    }

    async fn execute(
        &self,
        identity: RepoIdentity,
        request: AnalysisRequest,
        deadline: Option<Deadline>,
    ) -> ScanResult<AnalysisReport> {
        let repo_id = self.store.get_repo_id(&identity.owner, &identity.name)?;
        let last = self.store.get_last_commit(repo_id)?;
        debug!("{} is repository {} (last commit: {:?})", identity, repo_id, last);

        let snapshot = RepositorySnapshot::open(&request.path)?;
        let history = snapshot.enumerate_history()?;
        let commits = select_new_commits(&history, last.as_ref());
        let parallel = self.config.should_dispatch(commits.len());
        info!(
            "{}: {} of {} commits are new ({})",
            identity,
            commits.len(),
            history.len(),
            if parallel { "parallel" } else { "sequential" }
        );

        let meta = match &self.meta_source {
            Some(source) => MetaAnalyzer::new(identity.clone(), Arc::clone(source)),
            None => MetaAnalyzer::disabled(identity.clone()),
        };

        let (static_results, meta_results) = tokio::join!(
            self.analyse_static(snapshot, &request, &commits, parallel, deadline),
            within(deadline, async { meta.get_meta_analysis(&commits).await.map_err(ScanError::from) }),
        );
        let static_results = static_results?;
        let meta_results = meta_results?;

        let old_rows = match &last {
            Some(last) => self.store.get_rows_up_to(repo_id, last.timestamp)?,
            None => Vec::new(),
        };
        let new_rows = assemble(&static_results, &meta_results, repo_id);
        let inserted_rows = self.store.insert_rows_if_absent(&new_rows)?;
        let rows = merge_rows(old_rows, new_rows);
        let points = pivot(&rows);

        let summary = WalkSummary::from_results(&static_results);
        info!(
            "{}: analysed {} commits ({} failed), inserted {} rows, {} points",
            identity, summary.analyzed, summary.failed, inserted_rows, points.len()
        );

        Ok(AnalysisReport {
            repo_id,
            repository: identity.to_string(),
            selected: commits.len(),
            analyzed: summary.analyzed,
            failed: summary.failed,
            parallel,
            inserted_rows,
            points,
        })
    }

    async fn analyse_static(
        &self,
        snapshot: RepositorySnapshot,
        request: &AnalysisRequest,
        commits: &[Commit],
        parallel: bool,
        deadline: Option<Deadline>,
    ) -> ScanResult<Vec<AnalysisResult>> {
        if commits.is_empty() {
            return Ok(Vec::new());
        }

        if parallel {
            drop(snapshot);
            let dispatcher = ParallelDispatcher::new(Arc::clone(&self.runner), &self.config);
            return within(deadline, dispatcher.dispatch(&request.path, commits)).await;
        }

        let classifier = FileClassifier::from_settings(&self.config.settings);
        let mut walker = CommitWalker::new(snapshot, classifier, Arc::clone(&self.registry));
        if let Some(token) = &request.cancel {
            walker = walker.with_cancellation(token.clone());
        }
        if let Some(deadline) = deadline {
            walker = walker.with_deadline(deadline);
        }
        walker.walk(commits).await
    }
}

/// Abandon `work` once `deadline` passes; only for futures that hold no checkout of the user's clone
async fn within<T>(deadline: Option<Deadline>, work: impl Future<Output = ScanResult<T>>) -> ScanResult<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at(), work).await.unwrap_or_else(|_| {
            warn!("Deadline passed, abandoning outstanding work");
            Err(deadline.exceeded())
        }),
        None => work.await,
    }
}
