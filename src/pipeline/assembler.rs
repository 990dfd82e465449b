//! Analysis Assembler
//!
//! Flattens per-commit static results and per-commit meta metrics into
//! metric rows, then unions them with previously stored rows.
//!
//! Meta metrics are commit-scoped but are replicated onto every extension of
//! the commit, so each extension's rows carry the same issue and pull request
//! counts.

use std::collections::HashSet;
use log::debug;
use crate::meta::MetaMetrics;
use crate::metrics::NUMBER_OF_FILES;
use crate::scanner::messages::{AnalysisResult, MetricMap};
use crate::store::MetricRow;

/// Extension key used for commits that produced no extension groups
pub const NO_EXTENSION: &str = "";

/// One row per (commit, extension, metric), in commit order
pub fn assemble(results: &[AnalysisResult], meta: &MetaMetrics, repo_id: i64) -> Vec<MetricRow> {
    let empty = MetricMap::new();
    let mut rows = Vec::new();

    for result in results {
        let commit_meta = meta.get(&result.commit_id).unwrap_or(&empty);
        let commit_date = result.commit_date.timestamp_millis();

        let mut push = |extension: &str, metrics: MetricMap| {
            rows.extend(metrics.into_iter().map(|(metric, value)| MetricRow {
                repo_id,
                commit_id: result.commit_id.clone(),
                commit_date,
                file_extension: extension.to_string(),
                metric,
                value,
            }));
        };

        if result.metrics.is_empty() {
            // Failed checkouts and empty trees still appear in the timeline
            let mut metrics = MetricMap::from([(NUMBER_OF_FILES.to_string(), 0.0)]);
            merge_meta(&mut metrics, commit_meta);
            push(NO_EXTENSION, metrics);
            continue;
        }

        for (extension, static_metrics) in &result.metrics {
            let mut metrics = static_metrics.clone();
            merge_meta(&mut metrics, commit_meta);
            push(extension.as_str(), metrics);
        }
    }

    debug!("Assembled {} rows from {} commits", rows.len(), results.len());
    rows
}

/// Static metrics take precedence over a meta metric of the same name
fn merge_meta(metrics: &mut MetricMap, meta: &MetricMap) {
    for (name, value) in meta {
        metrics.entry(name.clone()).or_insert(*value);
    }
}

/// Old rows then new rows, dropping any row whose key was already seen
pub fn merge_rows(old: Vec<MetricRow>, new: Vec<MetricRow>) -> Vec<MetricRow> {
    let mut seen: HashSet<(i64, String, String, String)> = HashSet::with_capacity(old.len() + new.len());
    old.into_iter()
        .chain(new)
        .filter(|row| {
            seen.insert((row.repo_id, row.commit_id.clone(), row.file_extension.clone(), row.metric.clone()))
        })
        .collect()
}
