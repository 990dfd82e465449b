//! Repository path resolution and validation

use anyhow::{Result, Context};
use std::path::{Path, PathBuf};
use log::{info, debug};

/// Working directory of the repository at (or above) `path`, defaulting to
/// the current directory
pub fn resolve_repository_path(path: Option<&Path>) -> Result<PathBuf> {
    let start = match path {
        Some(path) => {
            debug!("Repository path provided: {}", path.display());
            if !path.exists() {
                anyhow::bail!("Directory does not exist: {}", path.display());
            }
            path.to_path_buf()
        }
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let repo = git2::Repository::discover(&start)
        .with_context(|| format!("Not a git repository: {}", start.display()))?;
    let workdir = repo
        .workdir()
        .with_context(|| format!("Repository at {} is bare; a working tree is required", start.display()))?;

    let resolved = workdir
        .canonicalize()
        .with_context(|| format!("Failed to resolve canonical path for: {}", workdir.display()))?;
    info!("Using git repository at {}", resolved.display());
    Ok(resolved)
}
