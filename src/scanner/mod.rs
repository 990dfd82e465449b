//! Repository Scanner Module
//!
//! Walks a repository history commit by commit: forced checkout, extension
//! classification and metric extraction, either sequentially in one working
//! tree or fanned out over worker processes with private clones.

pub mod version;
pub mod messages;
pub mod config;
pub mod error;
pub mod filters;
pub mod repository;
pub mod walker;
pub mod selector;
pub mod workspace;
pub mod dispatcher;

#[cfg(test)]
pub(crate) mod tests;

// Re-export core types for easier access
pub use config::{AnalysisConfig, ConfigError};
pub use error::{ScanError, ScanResult};
pub use filters::{FileClassifier, FileGroup};
pub use messages::{AnalysisResult, AnalysisSettings, Commit, ExtensionMetrics, MetricMap, WorkerRequest, WorkerResponse};
pub use repository::RepositorySnapshot;
pub use walker::{CommitState, CommitWalker, Deadline, WalkSummary};
pub use selector::{select_new_commits, LastKnownCommit};
pub use dispatcher::{run_worker_request, InProcessRunner, ParallelDispatcher, PartitionRunner, ProcessRunner};
pub use version::{get_protocol_version, is_protocol_compatible};
