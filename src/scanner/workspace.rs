//! Partition Workspace
//!
//! Independent clones of a base repository, one per dispatcher partition, so
//! concurrent checkouts never share a working tree.
//!
//! ```text
//! Workspace
//! ├── workspace_dir/
//! │   ├── <uuid>/                  (one run)
//! │   │   ├── partition-0/         (full clone)
//! │   │   ├── partition-1/
//! │   │   └── ...
//! │   └── ...
//! └── clones (Vec)                 (tracks active clones)
//! ```
//!
//! Everything under the run directory is removed by `cleanup_all`, and again on
//! drop if the caller did not get that far.

use std::fs;
use std::path::{Path, PathBuf};
use git2::build::RepoBuilder;
use log::{debug, warn};
use uuid::Uuid;
use crate::scanner::error::{ScanError, ScanResult};

/// Manages per-partition clones for one dispatch
pub struct Workspace {
    /// Base repository the clones are taken from
    source: PathBuf,
    /// Directory holding this run's clones
    run_dir: PathBuf,
    /// Clones created so far
    clones: Vec<PathBuf>,
}

impl Workspace {
    /// Create a run directory under `workspace_dir` for clones of `source`
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source: P, workspace_dir: Q) -> ScanResult<Self> {
        let run_dir = workspace_dir.as_ref().join(Uuid::new_v4().to_string());
        fs::create_dir_all(&run_dir)
            .map_err(|e| ScanError::Repository(format!("Failed to create workspace directory {}: {}", run_dir.display(), e)))?;

        Ok(Self {
            source: source.as_ref().to_path_buf(),
            run_dir,
            clones: Vec::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn clones(&self) -> &[PathBuf] {
        &self.clones
    }

    /// Clone the base repository for `partition`, returning the clone's path
    pub fn clone_for(&mut self, partition: usize) -> ScanResult<PathBuf> {
        let target = self.run_dir.join(format!("partition-{partition}"));
        let url = self.source.to_string_lossy().to_string();

        RepoBuilder::new()
            .clone(&url, &target)
            .map_err(|e| ScanError::Repository(format!("Failed to clone {} into {}: {}", self.source.display(), target.display(), e.message())))?;

        debug!("Cloned {} for partition {} at {}", self.source.display(), partition, target.display());
        self.clones.push(target.clone());
        Ok(target)
    }

    /// Remove every clone and the run directory
    pub fn cleanup_all(&mut self) -> ScanResult<()> {
        for clone in self.clones.drain(..) {
            if clone.exists() {
                fs::remove_dir_all(&clone)
                    .map_err(|e| ScanError::Repository(format!("Failed to remove clone {}: {}", clone.display(), e)))?;
            }
        }

        if self.run_dir.exists() {
            fs::remove_dir_all(&self.run_dir)
                .map_err(|e| ScanError::Repository(format!("Failed to remove workspace directory {}: {}", self.run_dir.display(), e)))?;
        }

        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup_all() {
            warn!("Workspace cleanup failed: {}", e);
        }
    }
}
