//! Pipeline Performance Benchmarks
//!
//! Measures the meta alignment sweep, working tree classification and the
//! row assembly/pivot stage at several sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chrono::{FixedOffset, TimeZone, Utc};
use tempfile::TempDir;

use gevol::meta::{align, EventKind, EventState, IssueEvent, MetaMetrics};
use gevol::pipeline::{assemble, pivot};
use gevol::scanner::{AnalysisResult, Commit, ExtensionMetrics, FileClassifier, MetricMap};

fn commits(count: i64) -> Vec<Commit> {
    let offset = FixedOffset::east_opt(0).unwrap();
    (0..count)
        .map(|i| Commit::new(format!("{i:040x}"), offset.timestamp_opt(1_000_000 + i * 3_600, 0).unwrap()))
        .collect()
}

fn events(count: i64) -> Vec<IssueEvent> {
    (0..count)
        .map(|i| IssueEvent {
            number: i as u64,
            kind: if i % 3 == 0 { EventKind::PullRequest } else { EventKind::Issue },
            state: if i % 2 == 0 { EventState::Open } else { EventState::Closed },
            created_at: Utc.timestamp_opt(1_000_000 + i * 1_800, 0).unwrap(),
            closed_at: None,
        })
        .collect()
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("meta_align");
    for size in [100i64, 1_000, 10_000] {
        let commits = commits(size);
        let events = events(size * 2);
        group.throughput(Throughput::Elements((size * 3) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| align(&events, &commits));
        });
    }
    group.finish();
}

fn populate_tree(files: usize) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let extensions = ["rs", "py", "js", "md", "json"];
    for i in 0..files {
        let sub = dir.path().join(format!("pkg{}", i % 10));
        std::fs::create_dir_all(&sub).expect("Failed to create dir");
        std::fs::write(sub.join(format!("file{i}.{}", extensions[i % extensions.len()])), "x\n")
            .expect("Failed to write file");
    }
    std::fs::create_dir_all(dir.path().join(".git")).expect("Failed to create .git");
    dir
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let classifier = FileClassifier::new(vec![".git".to_string(), "pkg0".to_string()], vec![".json".to_string()]);
    for files in [100usize, 1_000] {
        let tree = populate_tree(files);
        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::from_parameter(files), &files, |b, _| {
            b.iter(|| classifier.classify(tree.path()).expect("classify"));
        });
    }
    group.finish();
}

fn bench_assemble_and_pivot(c: &mut Criterion) {
    let commits = commits(500);
    let results: Vec<AnalysisResult> = commits
        .iter()
        .map(|commit| {
            let metrics: ExtensionMetrics = [".rs", ".py", ".js"]
                .iter()
                .map(|ext| {
                    let values: MetricMap = (0..8).map(|m| (format!("metric{m}"), m as f64)).collect();
                    (ext.to_string(), values)
                })
                .collect();
            AnalysisResult::analyzed(commit, metrics)
        })
        .collect();
    let meta: MetaMetrics = commits
        .iter()
        .map(|commit| (commit.id.clone(), MetricMap::from([("issues".to_string(), 3.0)])))
        .collect();

    c.bench_function("assemble_pivot_500_commits", |b| {
        b.iter(|| pivot(&assemble(&results, &meta, 1)));
    });
}

criterion_group!(benches, bench_align, bench_classify, bench_assemble_and_pivot);
criterion_main!(benches);
