//! Metric Extraction
//!
//! Per-extension static analysis behind a common capability interface.
//! The registry maps extensions to extractors and guarantees a result for
//! every group: a failing extractor is replaced by the generic fallback, and
//! a failing fallback by a bare file count.

pub mod error;
pub mod generic;
pub mod source;
pub mod command;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use crate::scanner::filters::FileGroup;
use crate::scanner::messages::{AnalysisSettings, ExtensionMetrics, MetricMap};

pub use error::{ExtractError, ExtractResult};
pub use generic::GenericExtractor;
pub use source::SourceExtractor;
pub use command::CommandExtractor;

pub const NUMBER_OF_FILES: &str = "numberOfFiles";
pub const LINES: &str = "lines";
pub const BYTES: &str = "bytes";
pub const BINARY_FILES: &str = "binaryFiles";
pub const SLOC: &str = "sloc";
pub const COMMENTS: &str = "comments";
pub const BLANK: &str = "blank";
pub const CYCLOMATIC: &str = "cyclomatic";
pub const AVERAGE_CYCLOMATIC: &str = "averageCyclomatic";
pub const COMMENT_RATIO: &str = "commentRatio";

/// Capability: turn a group of same-extension files into named metrics
#[async_trait]
pub trait MetricExtractor: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Analyse `paths`, all carrying `extension`
    async fn analyze(&self, extension: &str, paths: &[PathBuf]) -> ExtractResult<MetricMap>;
}

/// Normalise an extension key to lowercase with a leading dot
pub fn normalize_extension(extension: &str) -> String {
    let lower = extension.trim().to_lowercase();
    if lower.is_empty() || lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Extension -> extractor, with a designated fallback
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn MetricExtractor>>,
    fallback: Arc<dyn MetricExtractor>,
}

impl ExtractorRegistry {
    /// Create an empty registry that sends everything to `fallback`
    pub fn new(fallback: Arc<dyn MetricExtractor>) -> Self {
        Self {
            extractors: HashMap::new(),
            fallback,
        }
    }

    /// Generic fallback plus the source extractor for every language it knows
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(Arc::new(GenericExtractor::new()));
        let source = Arc::new(SourceExtractor::new());
        for extension in source.supported_extensions() {
            registry.register(extension, Arc::clone(&source) as Arc<dyn MetricExtractor>);
        }
        registry
    }

    /// Defaults overlaid with the configured external analyser commands
    pub fn from_settings(settings: &AnalysisSettings) -> ExtractResult<Self> {
        let mut registry = Self::with_defaults();
        let timeout = Duration::from_secs(settings.command_timeout_secs);
        for (extension, command_line) in &settings.extractor_commands {
            let extractor = CommandExtractor::new(command_line, timeout)?;
            registry.register(extension, Arc::new(extractor));
        }
        debug!("Dedicated extractors for {}", registry.extensions().join(" "));
        Ok(registry)
    }

    /// Register an extractor, returning the one it replaces
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn MetricExtractor>) -> Option<Arc<dyn MetricExtractor>> {
        self.extractors.insert(normalize_extension(extension), extractor)
    }

    /// Extractor that will handle `extension`
    pub fn extractor_for(&self, extension: &str) -> &Arc<dyn MetricExtractor> {
        self.extractors
            .get(&normalize_extension(extension))
            .unwrap_or(&self.fallback)
    }

    /// Extensions with a dedicated extractor
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.extractors.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Analyse one extension group; never fails
    pub async fn analyze(&self, extension: &str, paths: &[PathBuf]) -> MetricMap {
        let key = normalize_extension(extension);

        if let Some(extractor) = self.extractors.get(&key) {
            match extractor.analyze(&key, paths).await {
                Ok(metrics) => return metrics,
                Err(e) => warn!(
                    "Extractor '{}' failed for {} ({} files), using fallback: {}",
                    extractor.name(), display_extension(&key), paths.len(), e
                ),
            }
        }

        match self.fallback.analyze(&key, paths).await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Fallback extractor failed for {}: {}", display_extension(&key), e);
                let mut metrics = MetricMap::new();
                metrics.insert(NUMBER_OF_FILES.to_string(), paths.len() as f64);
                metrics
            }
        }
    }

    /// Analyse every group of a classified tree, one group at a time
    pub async fn analyze_group(&self, group: &FileGroup) -> ExtensionMetrics {
        let mut result = ExtensionMetrics::new();
        for (extension, paths) in group {
            let metrics = self.analyze(extension, paths).await;
            debug!("{}: {} metrics from {} files", display_extension(extension), metrics.len(), paths.len());
            result.insert(extension.clone(), metrics);
        }
        result
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn display_extension(extension: &str) -> &str {
    if extension.is_empty() { "<no extension>" } else { extension }
}
