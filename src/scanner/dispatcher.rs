//! Parallel Dispatcher
//!
//! Fans a large commit range out to worker processes. The range is cut into
//! contiguous chunks, one per worker, and each worker walks its chunk in a
//! private clone of the repository. Results are concatenated in partition
//! order, which reconstructs the input order.
//!
//! A worker that crashes, reports failure, or returns a result list that does
//! not match its assignment fails the whole dispatch; partial results are
//! never returned.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use crate::metrics::ExtractorRegistry;
use crate::scanner::config::AnalysisConfig;
use crate::scanner::filters::FileClassifier;
use crate::scanner::messages::{AnalysisResult, AnalysisSettings, Commit, WorkerRequest, WorkerResponse};
use crate::scanner::repository::RepositorySnapshot;
use crate::scanner::version::{get_protocol_version, is_protocol_compatible, version_to_date_string};
use crate::scanner::walker::CommitWalker;
use crate::scanner::workspace::Workspace;
use super::error::{ScanError, ScanResult};

/// Executes one partition request somewhere and returns the worker's reply
#[async_trait]
pub trait PartitionRunner: Send + Sync {
    async fn run(&self, request: WorkerRequest) -> ScanResult<WorkerResponse>;
}

/// Runs each partition in a child process speaking JSON over stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invoke the running executable's hidden `worker` command
    pub fn current_exe() -> ScanResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| ScanError::configuration(format!("Cannot locate the gevol executable: {e}")))?;
        Ok(Self::new(program, vec!["worker".to_string()]))
    }
}

#[async_trait]
impl PartitionRunner for ProcessRunner {
    async fn run(&self, request: WorkerRequest) -> ScanResult<WorkerResponse> {
        let index = request.partition;
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ScanError::protocol(format!("Cannot encode request for partition {index}: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::partition(index, format!("failed to start {}: {}", self.program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await
                .map_err(|e| ScanError::partition(index, format!("failed to send request: {e}")))?;
            // Dropping stdin signals end of request
        }

        let output = child.wait_with_output().await
            .map_err(|e| ScanError::partition(index, format!("worker did not respond: {e}")))?;

        if !output.status.success() {
            return Err(ScanError::partition(index, format!("worker exited with {}", output.status)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ScanError::partition(index, format!("unreadable worker response: {e}")))
    }
}

/// Runs each partition as a tokio task in this process
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessRunner;

#[async_trait]
impl PartitionRunner for InProcessRunner {
    async fn run(&self, request: WorkerRequest) -> ScanResult<WorkerResponse> {
        let index = request.partition;
        tokio::spawn(run_worker_request(request))
            .await
            .map_err(|e| ScanError::partition(index, format!("worker task panicked: {e}")))
    }
}

/// Worker side of the protocol: walk the assigned commits in the given clone
pub async fn run_worker_request(request: WorkerRequest) -> WorkerResponse {
    let partition = request.partition;

    if !is_protocol_compatible(request.protocol_version) {
        return WorkerResponse::Failed {
            partition,
            message: format!(
                "protocol version {} ({}) does not match worker version {} ({})",
                request.protocol_version,
                version_to_date_string(request.protocol_version),
                get_protocol_version(),
                version_to_date_string(get_protocol_version())
            ),
        };
    }

    match walk_partition(&request).await {
        Ok(results) => WorkerResponse::Completed { partition, results },
        Err(e) => {
            error!("Partition {} failed: {}", partition, e);
            WorkerResponse::Failed {
                partition,
                message: e.to_string(),
            }
        }
    }
}

async fn walk_partition(request: &WorkerRequest) -> ScanResult<Vec<AnalysisResult>> {
    debug!(
        "Partition {}: {} commits in {}",
        request.partition,
        request.commit_ids.len(),
        request.clone_path.display()
    );

    let snapshot = RepositorySnapshot::open(&request.clone_path)?;
    let classifier = FileClassifier::from_settings(&request.settings);
    let registry = ExtractorRegistry::from_settings(&request.settings)
        .map_err(|e| ScanError::configuration(e.to_string()))?;

    let mut walker = CommitWalker::new(snapshot, classifier, Arc::new(registry));
    walker.walk_ids(&request.commit_ids).await
}

/// Split `items` into at most `workers` contiguous, non-empty chunks
pub fn partition_contiguous<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk_size = items.len().div_ceil(workers.max(1));
    items.chunks(chunk_size).map(<[T]>::to_vec).collect()
}

/// Check a partition's results against its assignment
fn verify_partition(index: usize, assigned: &[String], results: &[AnalysisResult]) -> ScanResult<()> {
    if results.len() != assigned.len() {
        return Err(ScanError::partition(
            index,
            format!("expected {} results, received {}", assigned.len(), results.len()),
        ));
    }
    if let Some((expected, result)) = assigned.iter().zip(results).find(|(id, r)| **id != r.commit_id) {
        return Err(ScanError::partition(
            index,
            format!("result for {} where {} was expected", result.commit_id, expected),
        ));
    }
    Ok(())
}

/// Multi-process analysis of one commit range
pub struct ParallelDispatcher {
    runner: Arc<dyn PartitionRunner>,
    workers: usize,
    workspace_dir: PathBuf,
    settings: AnalysisSettings,
}

impl ParallelDispatcher {
    pub fn new(runner: Arc<dyn PartitionRunner>, config: &AnalysisConfig) -> Self {
        Self {
            runner,
            workers: config.workers.max(1),
            workspace_dir: config.effective_workspace_dir(),
            settings: config.settings.clone(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Analyse `commits` (oldest first) from clones of `base`, preserving order
    pub async fn dispatch(&self, base: &Path, commits: &[Commit]) -> ScanResult<Vec<AnalysisResult>> {
        let ids: Vec<String> = commits.iter().map(|c| c.id.clone()).collect();
        let chunks = partition_contiguous(&ids, self.workers);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        info!("Dispatching {} commits across {} partitions", ids.len(), chunks.len());

        let base = base.to_path_buf();
        let workspace_dir = self.workspace_dir.clone();
        let partitions = chunks.len();
        let (mut workspace, clone_paths) = tokio::task::spawn_blocking(move || -> ScanResult<_> {
            let mut workspace = Workspace::new(&base, &workspace_dir)?;
            let paths = (0..partitions)
                .map(|index| workspace.clone_for(index))
                .collect::<ScanResult<Vec<_>>>()?;
            Ok((workspace, paths))
        })
        .await??;

        let requests = chunks.iter().zip(clone_paths).enumerate().map(|(partition, (chunk, clone_path))| {
            WorkerRequest {
                protocol_version: get_protocol_version(),
                partition,
                clone_path,
                commit_ids: chunk.clone(),
                settings: self.settings.clone(),
            }
        });

        let responses = join_all(requests.map(|request| self.runner.run(request))).await;
        let merged = Self::merge(&chunks, responses);

        if let Err(e) = workspace.cleanup_all() {
            warn!("Failed to remove partition clones: {}", e);
        }

        merged
    }

    /// Concatenate partition results in order, failing on the first bad partition
    fn merge(chunks: &[Vec<String>], responses: Vec<ScanResult<WorkerResponse>>) -> ScanResult<Vec<AnalysisResult>> {
        let mut merged = Vec::with_capacity(chunks.iter().map(Vec::len).sum());

        for (index, (chunk, response)) in chunks.iter().zip(responses).enumerate() {
            match response? {
                WorkerResponse::Completed { partition, results } => {
                    if partition != index {
                        return Err(ScanError::protocol(format!(
                            "response for partition {partition} received in slot {index}"
                        )));
                    }
                    verify_partition(index, chunk, &results)?;
                    merged.extend(results);
                }
                WorkerResponse::Failed { partition, message } => {
                    return Err(ScanError::partition(partition, message));
                }
            }
        }

        Ok(merged)
    }
}
