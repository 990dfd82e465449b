//! Worker Process Tests
//!
//! Runs partitions through the real `gevol worker` binary over stdin/stdout.

#[path = "../common/mod.rs"]
mod common;

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;

use common::TestRepo;
use gevol::metrics::NUMBER_OF_FILES;
use gevol::pipeline::{AnalysisRequest, Pipeline};
use gevol::scanner::{
    get_protocol_version, AnalysisConfig, AnalysisSettings, ParallelDispatcher, ProcessRunner, ScanError,
    WorkerRequest, WorkerResponse,
};
use gevol::store::SqliteStore;

fn worker_runner() -> Arc<ProcessRunner> {
    Arc::new(ProcessRunner::new(env!("CARGO_BIN_EXE_gevol"), vec!["worker".to_string()]))
}

fn run_worker_binary(payload: &[u8]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_gevol"))
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("worker starts");
    child.stdin.take().unwrap().write_all(payload).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn worker_answers_one_request() {
    let repo = TestRepo::new();
    let c1 = repo.commit(&[("a.py", "x = 1\n")], 1_000);
    let c2 = repo.commit(&[("b.py", "y = 2\n")], 2_000);

    let request = WorkerRequest {
        protocol_version: get_protocol_version(),
        partition: 5,
        clone_path: repo.path().to_path_buf(),
        commit_ids: vec![c1.id.clone(), c2.id.clone()],
        settings: AnalysisSettings::default(),
    };
    let output = run_worker_binary(&serde_json::to_vec(&request).unwrap());
    assert!(output.status.success());

    let response: WorkerResponse = serde_json::from_slice(&output.stdout).unwrap();
    match response {
        WorkerResponse::Completed { partition, results } => {
            assert_eq!(partition, 5);
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].commit_id, c1.id);
            assert_eq!(results[1].metrics[".py"][NUMBER_OF_FILES], 2.0);
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn worker_reports_protocol_mismatch_as_failed_response() {
    let repo = TestRepo::new();
    repo.commit(&[("a.py", "x\n")], 1_000);

    let request = WorkerRequest {
        protocol_version: 19700101,
        partition: 0,
        clone_path: repo.path().to_path_buf(),
        commit_ids: Vec::new(),
        settings: AnalysisSettings::default(),
    };
    let output = run_worker_binary(&serde_json::to_vec(&request).unwrap());
    let response: WorkerResponse = serde_json::from_slice(&output.stdout).unwrap();
    assert!(matches!(response, WorkerResponse::Failed { partition: 0, .. }));
}

#[test]
fn worker_rejects_malformed_input() {
    let output = run_worker_binary(b"{ not json");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn dispatch_through_worker_processes() {
    let repo = TestRepo::new();
    for i in 0..9i64 {
        repo.commit(&[(format!("f{i}.rs").as_str(), "fn f() {}\n")], 5_000 + i);
    }
    let workspace = TempDir::new().unwrap();
    let config = AnalysisConfig::builder()
        .with_workers(3)
        .with_parallel_threshold(2)
        .with_workspace_dir(workspace.path().to_path_buf())
        .build()
        .unwrap();

    let pipeline = Pipeline::new(config, Arc::new(SqliteStore::in_memory().unwrap()), worker_runner(), None).unwrap();
    let report = pipeline.run(AnalysisRequest::new("octo/demo", repo.path())).await.unwrap();

    assert!(report.parallel);
    assert_eq!(report.analyzed, 9);
    let files: Vec<f64> = report.points.iter().map(|p| p.metrics[NUMBER_OF_FILES]).collect();
    assert_eq!(files, (1..=9).map(f64::from).collect::<Vec<_>>());
}

#[tokio::test]
async fn unknown_commit_in_a_partition_fails_the_dispatch() {
    let repo = TestRepo::new();
    let c1 = repo.commit(&[("a.py", "x\n")], 1_000);
    let workspace = TempDir::new().unwrap();
    let config = AnalysisConfig::builder()
        .with_workers(2)
        .with_workspace_dir(workspace.path().to_path_buf())
        .build()
        .unwrap();

    let mut bogus = c1.clone();
    bogus.id = "0123456789abcdef0123456789abcdef01234567".to_string();

    let dispatcher = ParallelDispatcher::new(worker_runner(), &config);
    let result = dispatcher.dispatch(repo.path(), &[c1, bogus]).await;
    assert!(matches!(result, Err(ScanError::Partition { index: 1, .. })));
}
