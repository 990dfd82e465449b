//! File Classification
//!
//! Groups the files of a checked-out working tree by extension after applying
//! the exclusion filters. Exclusion happens before grouping, so an excluded
//! path never reaches any extension group.
//!
//! Matching rules, both evaluated on the path relative to the tree root with
//! `/` separators:
//! - excluded directories are plain prefix matches (`.git` excludes `.git/HEAD`)
//! - excluded extensions are plain suffix matches, so whole file names such as
//!   `package-lock.json` can be excluded as well as `.min.js`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use log::{debug, trace};
use walkdir::WalkDir;
use crate::scanner::messages::AnalysisSettings;
use super::error::{ScanError, ScanResult};

/// Extension (with leading dot, lowercase; empty for none) -> absolute paths
pub type FileGroup = BTreeMap<String, Vec<PathBuf>>;

/// Exclusion-aware extension grouping
#[derive(Debug, Clone, Default)]
pub struct FileClassifier {
    excluded_dirs: Vec<String>,
    excluded_extensions: Vec<String>,
}

impl FileClassifier {
    pub fn new(excluded_dirs: Vec<String>, excluded_extensions: Vec<String>) -> Self {
        Self {
            excluded_dirs,
            excluded_extensions,
        }
    }

    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        Self::new(settings.excluded_dirs.clone(), settings.excluded_extensions.clone())
    }

    /// Whether a root-relative path is filtered out
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.excluded_dirs.iter().any(|dir| relative.starts_with(dir.as_str()))
            || self.excluded_extensions.iter().any(|ext| relative.ends_with(ext.as_str()))
    }

    /// Walk the tree under `root` and group every non-excluded file
    pub fn classify(&self, root: &Path) -> ScanResult<FileGroup> {
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                // Every descendant of a pruned directory shares its prefix
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.excluded_dirs.iter().any(|dir| relative_path(root, entry.path()).starts_with(dir.as_str()))
            });

        for entry in walker {
            let entry = entry.map_err(|e| ScanError::classification(format!("Failed to walk {}: {}", root.display(), e)))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        let group = self.classify_paths(root, files);
        debug!(
            "Classified {} files into {} extension groups under {}",
            group.values().map(Vec::len).sum::<usize>(),
            group.len(),
            root.display()
        );
        Ok(group)
    }

    /// Group an explicit list of paths located under `root`
    pub fn classify_paths<I, P>(&self, root: &Path, paths: I) -> FileGroup
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut group = FileGroup::new();

        for path in paths {
            let path = path.into();
            let relative = relative_path(root, &path);
            if self.is_excluded(&relative) {
                trace!("Excluding {relative}");
                continue;
            }
            group.entry(extension_of(&path)).or_default().push(path);
        }

        for paths in group.values_mut() {
            paths.sort();
        }
        group
    }
}

/// Root-relative path with `/` separators; paths outside `root` are returned whole
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let text = relative.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Lowercase extension with its leading dot; dotfiles and bare names map to ""
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}
