//! Generic Extractor
//!
//! Language-agnostic metrics used for extensions without a dedicated
//! extractor and as the fallback whenever a dedicated extractor fails.
//! Binary content is detected by sniffing and contributes no lines.

use std::fs;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use log::trace;
use rayon::prelude::*;
use crate::scanner::messages::MetricMap;
use super::error::ExtractResult;
use super::{MetricExtractor, BINARY_FILES, BYTES, LINES, NUMBER_OF_FILES};

/// Bytes inspected when deciding whether content is text, as git does
pub const SNIFF_LEN: usize = 8000;

/// Whether `content` looks like binary data
pub fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(SNIFF_LEN)].contains(&0)
}

/// Number of lines in a text buffer; a trailing fragment without newline counts
pub fn count_lines(content: &[u8]) -> usize {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.iter().filter(|&&b| b == b'\n').count();
    if content.last() == Some(&b'\n') { newlines } else { newlines + 1 }
}

/// Per-file measurement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMeasure {
    pub lines: usize,
    pub bytes: usize,
    pub binary: bool,
}

impl FileMeasure {
    pub fn measure(path: &Path) -> Self {
        match fs::read(path) {
            Ok(content) => {
                let binary = is_binary(&content);
                Self {
                    lines: if binary { 0 } else { count_lines(&content) },
                    bytes: content.len(),
                    binary,
                }
            }
            Err(e) => {
                // Unreadable files still count as files
                trace!("Could not read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// File count, line count, byte count and binary file count
#[derive(Debug, Clone, Default)]
pub struct GenericExtractor;

impl GenericExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core, reading files in parallel on the rayon pool
    pub fn measure_paths(paths: &[PathBuf]) -> MetricMap {
        let measures: Vec<FileMeasure> = paths.par_iter().map(|p| FileMeasure::measure(p)).collect();

        let mut metrics = MetricMap::new();
        metrics.insert(NUMBER_OF_FILES.to_string(), paths.len() as f64);
        metrics.insert(LINES.to_string(), measures.iter().map(|m| m.lines).sum::<usize>() as f64);
        metrics.insert(BYTES.to_string(), measures.iter().map(|m| m.bytes).sum::<usize>() as f64);
        metrics.insert(BINARY_FILES.to_string(), measures.iter().filter(|m| m.binary).count() as f64);
        metrics
    }
}

#[async_trait]
impl MetricExtractor for GenericExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    async fn analyze(&self, _extension: &str, paths: &[PathBuf]) -> ExtractResult<MetricMap> {
        let paths = paths.to_vec();
        let metrics = tokio::task::spawn_blocking(move || Self::measure_paths(&paths)).await?;
        Ok(metrics)
    }
}
