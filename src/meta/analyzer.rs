//! Meta Analyzer
//!
//! Turns a repository's issue and pull request history into per-commit
//! metrics. Issues and pull requests are aligned separately.

use std::collections::BTreeMap;
use std::sync::Arc;
use log::{debug, info};
use crate::scanner::messages::{Commit, MetricMap};
use super::aligner::{align, StateCounts};
use super::error::MetaResult;
use super::{
    EventKind, IssueEvent, MetaSource, RepoIdentity, CLOSED_ISSUES, CLOSED_PULL_REQUESTS, ISSUES,
    OPEN_ISSUES, OPEN_PULL_REQUESTS, PULL_REQUESTS,
};

/// Commit id -> meta metrics
pub type MetaMetrics = BTreeMap<String, MetricMap>;

pub struct MetaAnalyzer {
    identity: RepoIdentity,
    source: Option<Arc<dyn MetaSource>>,
}

impl MetaAnalyzer {
    pub fn new(identity: RepoIdentity, source: Arc<dyn MetaSource>) -> Self {
        Self {
            identity,
            source: Some(source),
        }
    }

    /// Analyzer that contributes no metrics
    pub fn disabled(identity: RepoIdentity) -> Self {
        Self { identity, source: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Per-commit issue and pull request counts for `commits`
    ///
    /// ```rust
    /// use gevol::meta::{MetaAnalyzer, RepoIdentity};
    /// # tokio_test::block_on(async {
    /// let analyzer = MetaAnalyzer::disabled(RepoIdentity::new("octo", "demo"));
    /// assert!(analyzer.get_meta_analysis(&[]).await.unwrap().is_empty());
    /// # });
    /// ```
    pub async fn get_meta_analysis(&self, commits: &[Commit]) -> MetaResult<MetaMetrics> {
        let Some(source) = &self.source else {
            debug!("Meta-analysis disabled for {}", self.identity);
            return Ok(MetaMetrics::new());
        };
        if commits.is_empty() {
            return Ok(MetaMetrics::new());
        }

        let events = source.fetch_events(&self.identity).await?;
        info!("Fetched {} issues and pull requests for {} from {}", events.len(), self.identity, source.name());
        Ok(Self::metrics_for(events, commits))
    }

    /// Align `events` onto `commits`; both are sorted here
    pub fn metrics_for(events: Vec<IssueEvent>, commits: &[Commit]) -> MetaMetrics {
        let mut commits = commits.to_vec();
        commits.sort_by_key(Commit::timestamp_millis);

        let (mut issues, mut pulls): (Vec<IssueEvent>, Vec<IssueEvent>) =
            events.into_iter().partition(|e| e.kind == EventKind::Issue);
        issues.sort_by_key(IssueEvent::created_millis);
        pulls.sort_by_key(IssueEvent::created_millis);

        let issue_counts = align(&issues, &commits);
        let pull_counts = align(&pulls, &commits);

        commits
            .iter()
            .map(|commit| {
                let issues = issue_counts.get(&commit.id).copied().unwrap_or_default();
                let pulls = pull_counts.get(&commit.id).copied().unwrap_or_default();
                (commit.id.clone(), to_metrics(issues, pulls))
            })
            .collect()
    }
}

fn to_metrics(issues: StateCounts, pulls: StateCounts) -> MetricMap {
    MetricMap::from([
        (ISSUES.to_string(), issues.total as f64),
        (OPEN_ISSUES.to_string(), issues.open as f64),
        (CLOSED_ISSUES.to_string(), issues.closed as f64),
        (PULL_REQUESTS.to_string(), pulls.total as f64),
        (OPEN_PULL_REQUESTS.to_string(), pulls.open as f64),
        (CLOSED_PULL_REQUESTS.to_string(), pulls.closed as f64),
    ])
}
