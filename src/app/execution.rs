//! Command execution: `analyse` and the hidden `worker` entry point

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use crate::{cli, config};
use crate::pipeline::{AnalysisRequest, Pipeline};
use crate::scanner::dispatcher::{run_worker_request, ProcessRunner};
use crate::scanner::messages::{WorkerRequest, WorkerResponse};
use super::initialization::{build_analysis_config, create_meta_source, open_store};
use super::repository::resolve_repository_path;

/// Run one incremental analysis and write its points (or full report)
pub async fn run_analysis(args: &cli::AnalyseArgs, config: &config::ConfigManager, cancel: CancellationToken) -> Result<()> {
    let path = resolve_repository_path(args.path.as_deref())?;
    let analysis = build_analysis_config(args, config)?;
    let store = Arc::new(open_store(args, config)?);
    let meta_source = create_meta_source(args, config)?;
    let runner = Arc::new(ProcessRunner::current_exe()?);

    let pipeline = Pipeline::new(analysis, store, runner, meta_source)?;
    let request = AnalysisRequest::new(args.repository.clone(), path).with_cancellation(cancel);

    let report = pipeline.run(request).await
        .with_context(|| format!("Analysis of {} failed", args.repository))?;

    if report.failed > 0 {
        warn!("{} of {} commits could not be analysed", report.failed, report.selected);
    }

    if args.report {
        write_json(&report, args.output.as_deref())?;
    } else {
        write_json(&report.points, args.output.as_deref())?;
    }
    info!("Wrote {} points for {}", report.points.len(), report.repository);
    Ok(())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
            writer.flush()?;
            debug!("Output written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Analyse one partition and answer on stdout
pub async fn run_worker(request: WorkerRequest) -> Result<()> {
    debug!("Worker received partition {} ({} commits)", request.partition, request.commit_ids.len());

    let response = run_worker_request(request).await;
    if let WorkerResponse::Failed { partition, message } = &response {
        warn!("Partition {} failed: {}", partition, message);
    }

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    serde_json::to_writer(&mut writer, &response).context("Failed to write worker response")?;
    writer.flush()?;
    Ok(())
}

/// Parse the request before logging is installed so log lines can carry the partition
pub async fn read_worker_request() -> Result<WorkerRequest> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read worker request from stdin")?;
    serde_json::from_slice(&input).context("Malformed worker request")
}
