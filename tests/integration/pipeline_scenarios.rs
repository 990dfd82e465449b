//! Pipeline Scenario Tests
//!
//! Drives the public API end to end against real temporary repositories:
//! selection, walking, parallel dispatch, meta alignment, assembly and storage.

#[path = "../common/mod.rs"]
mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::{FixedOffset, TimeZone};
use tempfile::TempDir;

use common::{issue, pull_request, FixedEvents, TestRepo};
use gevol::meta::{
    align, EventState, CLOSED_ISSUES, CLOSED_PULL_REQUESTS, ISSUES, OPEN_ISSUES, PULL_REQUESTS,
};
use gevol::metrics::{ExtractorRegistry, NUMBER_OF_FILES};
use gevol::pipeline::{AnalysisReport, AnalysisRequest, Pipeline, NO_EXTENSION};
use gevol::scanner::{
    select_new_commits, AnalysisConfig, Commit, CommitWalker, FileClassifier, InProcessRunner,
    LastKnownCommit, ParallelDispatcher, RepositorySnapshot,
};
use gevol::store::{MetricStore, SqliteStore};

fn config(workers: usize, threshold: usize, workspace: &TempDir) -> AnalysisConfig {
    AnalysisConfig::builder()
        .with_workers(workers)
        .with_parallel_threshold(threshold)
        .with_workspace_dir(workspace.path().to_path_buf())
        .build()
        .expect("valid config")
}

fn classifier() -> FileClassifier {
    FileClassifier::new(vec![".git".to_string()], Vec::new())
}

fn walker(repo: &TestRepo) -> CommitWalker {
    let snapshot = RepositorySnapshot::open(repo.path()).unwrap();
    CommitWalker::new(snapshot, classifier(), Arc::new(ExtractorRegistry::with_defaults()))
}

async fn run_once(db_path: &Path, workspace: &TempDir, repo: &TestRepo) -> AnalysisReport {
    let store = Arc::new(SqliteStore::open(db_path).unwrap());
    let pipeline = Pipeline::new(config(1, 10, workspace), store, Arc::new(InProcessRunner), None).unwrap();
    pipeline.run(AnalysisRequest::new("octo/demo", repo.path())).await.unwrap()
}

#[tokio::test]
async fn scenario_a_unchanged_file_across_three_commits() {
    let repo = TestRepo::new();
    repo.commit(&[("a.py", "print('hello')\n")], 1_000);
    repo.commit(&[], 2_000);
    repo.commit(&[], 3_000);

    let history = RepositorySnapshot::open(repo.path()).unwrap().enumerate_history().unwrap();
    let selected = select_new_commits(&history, None);
    assert_eq!(selected.len(), 3);
    assert!(selected.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    let results = walker(&repo).walk(&selected).await.unwrap();
    assert_eq!(results.len(), 3);
    for (result, commit) in results.iter().zip(&selected) {
        assert_eq!(result.commit_id, commit.id);
        assert_eq!(result.metrics.len(), 1);
        assert_eq!(result.metrics[".py"][NUMBER_OF_FILES], 1.0);
    }
}

#[test]
fn scenario_b_git_directory_is_excluded_before_grouping() {
    let root = PathBuf::from("/repo");
    let group = classifier().classify_paths(
        &root,
        ["/repo/.git/HEAD", "/repo/src/a.js", "/repo/src/b.js"],
    );

    assert_eq!(group.len(), 1);
    assert_eq!(group[".js"], vec![PathBuf::from("/repo/src/a.js"), PathBuf::from("/repo/src/b.js")]);
}

#[test]
fn scenario_c_meta_alignment_counts() {
    let offset = FixedOffset::east_opt(0).unwrap();
    let commits: Vec<Commit> = [100, 200, 300]
        .iter()
        .map(|secs| Commit::new(format!("c{secs}"), offset.timestamp_opt(*secs, 0).unwrap()))
        .collect();
    let events = vec![
        issue(1, 50, EventState::Open),
        issue(2, 150, EventState::Open),
        issue(3, 250, EventState::Closed),
    ];

    let counts = align(&events, &commits);
    let triple = |id: &str| {
        let c = counts[id];
        (c.total, c.open, c.closed)
    };
    assert_eq!(triple("c100"), (1, 1, 0));
    assert_eq!(triple("c200"), (2, 2, 0));
    assert_eq!(triple("c300"), (3, 2, 1));
}

#[tokio::test]
async fn scenario_d_failed_checkout_does_not_stop_the_walk() {
    let repo = TestRepo::new();
    let c1 = repo.commit(&[("a.rs", "fn a() {}\n")], 1_000);
    let c3 = repo.commit(&[("b.rs", "fn b() {}\n")], 3_000);
    let offset = FixedOffset::east_opt(0).unwrap();
    let missing = Commit::new("0123456789abcdef0123456789abcdef01234567", offset.timestamp_opt(2_000, 0).unwrap());

    let results = walker(&repo).walk(&[c1, missing.clone(), c3.clone()]).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[1].metrics.is_empty());
    assert!(results[1].error.is_some());
    assert_eq!(results[1].commit_id, missing.id);
    assert_eq!(results[2].commit_id, c3.id);
    assert_eq!(results[2].metrics[".rs"][NUMBER_OF_FILES], 2.0);
}

#[tokio::test]
async fn p1_second_run_inserts_no_rows() {
    let repo = TestRepo::new();
    repo.commit(&[("a.py", "x = 1\n")], 1_000);
    repo.commit(&[("b.js", "let y = 2;\n")], 2_000);
    let workspace = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("metrics.db");

    let first = run_once(&db_path, &workspace, &repo).await;
    assert!(first.inserted_rows > 0);
    let second = run_once(&db_path, &workspace, &repo).await;
    assert_eq!(second.selected, 0);
    assert_eq!(second.inserted_rows, 0);
    assert_eq!(second.points, first.points);
}

#[tokio::test]
async fn p3_only_commits_after_last_known_are_selected() {
    let repo = TestRepo::new();
    repo.commit(&[("a.py", "1\n")], 1_000);
    let c2 = repo.commit(&[("a.py", "2\n")], 2_000);
    let c3 = repo.commit(&[("a.py", "3\n")], 3_000);

    let history = RepositorySnapshot::open(repo.path()).unwrap().enumerate_history().unwrap();
    let selected = select_new_commits(&history, Some(&LastKnownCommit::from(&c2)));
    assert_eq!(selected.iter().map(|c| c.id.clone()).collect::<Vec<_>>(), vec![c3.id]);
}

#[tokio::test]
async fn p5_four_partitions_match_a_single_walker() {
    let repo = TestRepo::new();
    for i in 0..20i64 {
        let name = format!("src/m{}.{}", i, if i % 2 == 0 { "py" } else { "js" });
        repo.commit(&[(name.as_str(), "line\nline\n")], 10_000 + i * 60);
    }
    let history = RepositorySnapshot::open(repo.path()).unwrap().enumerate_history().unwrap();
    let commits = select_new_commits(&history, None);
    assert_eq!(commits.len(), 20);

    let sequential = walker(&repo).walk(&commits).await.unwrap();

    let workspace = TempDir::new().unwrap();
    let dispatcher = ParallelDispatcher::new(Arc::new(InProcessRunner), &config(4, 0, &workspace));
    let parallel = dispatcher.dispatch(repo.path(), &commits).await.unwrap();

    assert_eq!(parallel, sequential);
    // Clones are gone once dispatch returns
    assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn p6_rows_are_unique_across_runs_and_meta_is_replicated() {
    let repo = TestRepo::new();
    repo.commit(&[("a.py", "x = 1\n"), ("b.js", "let y;\n")], 1_000);
    repo.commit(&[("c.py", "z = 3\n")], 2_000);
    let workspace = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let events = vec![
        issue(1, 500, EventState::Open),
        issue(2, 1_500, EventState::Closed),
        pull_request(3, 900, EventState::Merged),
    ];

    let pipeline = Pipeline::new(
        config(1, 10, &workspace),
        Arc::clone(&store) as Arc<dyn MetricStore>,
        Arc::new(InProcessRunner),
        Some(Arc::new(FixedEvents(events))),
    )
    .unwrap();

    let first = pipeline.run(AnalysisRequest::new("https://github.com/octo/demo.git", repo.path())).await.unwrap();
    pipeline.run(AnalysisRequest::new("octo/demo", repo.path())).await.unwrap();

    let rows = store.get_rows_up_to(first.repo_id, i64::MAX).unwrap();
    let mut keys: Vec<_> = rows.iter().map(|r| r.key()).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);

    // Both extensions of the first commit carry the same commit-scoped counts
    let first_commit: Vec<_> = first.points.iter().filter(|p| p.commit_date == 1_000_000).collect();
    assert_eq!(first_commit.len(), 2);
    for point in first_commit {
        assert_eq!(point.metrics[ISSUES], 1.0);
        assert_eq!(point.metrics[OPEN_ISSUES], 1.0);
        assert_eq!(point.metrics[PULL_REQUESTS], 1.0);
        assert_eq!(point.metrics[CLOSED_PULL_REQUESTS], 1.0);
    }

    let second_commit = first.points.iter().find(|p| p.commit_date == 2_000_000).unwrap();
    assert_eq!(second_commit.metrics[ISSUES], 2.0);
    assert_eq!(second_commit.metrics[CLOSED_ISSUES], 1.0);
}

#[tokio::test]
async fn empty_tree_commit_stays_in_the_timeline() {
    let repo = TestRepo::new();
    repo.commit(&[("node_modules/dep.js", "x\n")], 1_000);
    repo.commit(&[("src/app.js", "y\n")], 2_000);
    let workspace = TempDir::new().unwrap();

    let config = AnalysisConfig::builder()
        .with_workers(1)
        .with_workspace_dir(workspace.path().to_path_buf())
        .exclude_dir("node_modules")
        .build()
        .unwrap();
    let pipeline = Pipeline::new(config, Arc::new(SqliteStore::in_memory().unwrap()), Arc::new(InProcessRunner), None).unwrap();
    let report = pipeline.run(AnalysisRequest::new("octo/demo", repo.path())).await.unwrap();

    assert_eq!(report.points.len(), 2);
    assert_eq!(report.points[0].file_extension, NO_EXTENSION);
    assert_eq!(report.points[0].metrics[NUMBER_OF_FILES], 0.0);
    assert_eq!(report.points[1].file_extension, ".js");
}
