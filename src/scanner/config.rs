//! Analysis Configuration
//!
//! Static configuration for a history analysis run: exclusion filters,
//! external extractor commands, worker fan-out and the overall deadline.
//!
//! ## Usage Patterns
//!
//! ### Basic Configuration
//! ```rust,no_run
//! use gevol::scanner::config::AnalysisConfig;
//!
//! let config = AnalysisConfig::default();
//! ```
//!
//! ### Builder Pattern
//! ```rust,no_run
//! use gevol::scanner::config::AnalysisConfig;
//!
//! let config = AnalysisConfig::builder()
//!     .with_workers(4)
//!     .with_parallel_threshold(25)
//!     .exclude_dir("node_modules")
//!     .exclude_extension(".min.js")
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::scanner::messages::AnalysisSettings;

/// Default number of new commits above which work is fanned out to workers
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10;

/// Analysis configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Classification and extraction settings, shipped verbatim to workers
    pub settings: AnalysisSettings,
    /// Number of worker processes for large histories
    pub workers: usize,
    /// Dispatch to workers only when more than this many commits are new
    pub parallel_threshold: usize,
    /// Directory holding per-partition clones (None = use temp directory)
    pub workspace_dir: Option<PathBuf>,
    /// Overall deadline for one pipeline run
    pub deadline: Option<Duration>,
}

/// Configuration builder for fluent API
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    excluded_dirs: Vec<String>,
    excluded_extensions: Vec<String>,
    extractor_commands: BTreeMap<String, String>,
    command_timeout_secs: u64,
    workers: usize,
    parallel_threshold: usize,
    workspace_dir: Option<PathBuf>,
    deadline: Option<Duration>,
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Worker count must be greater than zero")]
    InvalidWorkers,
    #[error("Excluded directory entries must not be empty")]
    EmptyExcludedDir,
    #[error("Excluded extension entries must not be empty")]
    EmptyExcludedExtension,
    #[error("Extractor command for '{0}' is empty")]
    EmptyExtractorCommand(String),
    #[error("Extractor command timeout must be greater than zero")]
    InvalidCommandTimeout,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            settings: AnalysisSettings::default(),
            workers: num_cpus::get(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            workspace_dir: None,
            deadline: None,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder
    pub fn builder() -> AnalysisConfigBuilder {
        let defaults = AnalysisSettings::default();
        AnalysisConfigBuilder {
            excluded_dirs: defaults.excluded_dirs,
            excluded_extensions: defaults.excluded_extensions,
            extractor_commands: defaults.extractor_commands,
            command_timeout_secs: defaults.command_timeout_secs,
            workers: num_cpus::get(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            workspace_dir: None,
            deadline: None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }

        // An empty prefix or suffix would exclude every file
        if self.settings.excluded_dirs.iter().any(|d| d.is_empty()) {
            return Err(ConfigError::EmptyExcludedDir);
        }

        if self.settings.excluded_extensions.iter().any(|e| e.is_empty()) {
            return Err(ConfigError::EmptyExcludedExtension);
        }

        if let Some((ext, _)) = self.settings.extractor_commands.iter().find(|(_, cmd)| cmd.trim().is_empty()) {
            return Err(ConfigError::EmptyExtractorCommand(ext.clone()));
        }

        if self.settings.command_timeout_secs == 0 {
            return Err(ConfigError::InvalidCommandTimeout);
        }

        Ok(())
    }

    /// Whether a run with `new_commits` commits should use worker processes
    pub fn should_dispatch(&self, new_commits: usize) -> bool {
        self.workers > 1 && new_commits > self.parallel_threshold
    }

    /// Directory that receives per-partition clones
    pub fn effective_workspace_dir(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("gevol-workspace"))
    }
}

impl AnalysisConfigBuilder {
    /// Replace the excluded directory prefixes
    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    /// Add an excluded directory prefix
    pub fn exclude_dir(mut self, dir: impl Into<String>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }

    pub fn with_excluded_extensions(mut self, extensions: Vec<String>) -> Self {
        self.excluded_extensions = extensions;
        self
    }

    /// Add an excluded path suffix
    pub fn exclude_extension(mut self, extension: impl Into<String>) -> Self {
        self.excluded_extensions.push(extension.into());
        self
    }

    /// Route an extension to an external analyser command
    pub fn with_extractor_command(mut self, extension: impl Into<String>, command: impl Into<String>) -> Self {
        self.extractor_commands.insert(extension.into(), command.into());
        self
    }

    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Set worker process count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_workspace_dir(mut self, dir: PathBuf) -> Self {
        self.workspace_dir = Some(dir);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let config = AnalysisConfig {
            settings: AnalysisSettings {
                excluded_dirs: self.excluded_dirs,
                excluded_extensions: self.excluded_extensions,
                extractor_commands: self.extractor_commands,
                command_timeout_secs: self.command_timeout_secs,
            },
            workers: self.workers,
            parallel_threshold: self.parallel_threshold,
            workspace_dir: self.workspace_dir,
            deadline: self.deadline,
        };
        config.validate()?;
        Ok(config)
    }
}
