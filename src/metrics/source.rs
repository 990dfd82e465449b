//! Source Code Extractor
//!
//! Line classification (code, comment, blank) and cyclomatic complexity for
//! common programming languages. Complexity is 1 per file plus one per
//! decision point, counted after comments and string literals are stripped.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use log::trace;
use rayon::prelude::*;
use regex::Regex;
use crate::scanner::messages::MetricMap;
use super::error::{ExtractError, ExtractResult};
use super::generic::{count_lines, is_binary};
use super::{
    MetricExtractor, AVERAGE_CYCLOMATIC, BLANK, COMMENTS, COMMENT_RATIO, CYCLOMATIC, LINES,
    NUMBER_OF_FILES, SLOC,
};

/// Comment and decision syntax for one language
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub line_comments: &'static [&'static str],
    pub block_comment: Option<(&'static str, &'static str)>,
    /// Whether `'` delimits strings (false where it marks lifetimes or chars)
    pub single_quote_strings: bool,
    pub decision_keywords: &'static [&'static str],
    pub decision_operators: &'static [&'static str],
}

const C_LIKE_OPERATORS: &[&str] = &["&&", "||", " ? "];

fn builtin_languages() -> Vec<(&'static [&'static str], LanguageSpec)> {
    vec![
        (&[".py"], LanguageSpec {
            name: "Python",
            line_comments: &["#"],
            block_comment: None,
            single_quote_strings: true,
            decision_keywords: &["if", "elif", "for", "while", "except", "with", "and", "or"],
            decision_operators: &[],
        }),
        (&[".js", ".jsx", ".ts", ".tsx"], LanguageSpec {
            name: "JavaScript",
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            single_quote_strings: true,
            decision_keywords: &["if", "for", "while", "case", "catch"],
            decision_operators: C_LIKE_OPERATORS,
        }),
        (&[".rs"], LanguageSpec {
            name: "Rust",
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            single_quote_strings: false,
            decision_keywords: &["if", "for", "while", "loop", "match"],
            decision_operators: &["&&", "||", "?"],
        }),
        (&[".java", ".cs"], LanguageSpec {
            name: "Java",
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            single_quote_strings: true,
            decision_keywords: &["if", "for", "while", "do", "case", "catch"],
            decision_operators: C_LIKE_OPERATORS,
        }),
        (&[".c", ".h", ".cpp", ".cc", ".hpp"], LanguageSpec {
            name: "C",
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            single_quote_strings: true,
            decision_keywords: &["if", "for", "while", "do", "case", "catch"],
            decision_operators: C_LIKE_OPERATORS,
        }),
        (&[".go"], LanguageSpec {
            name: "Go",
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            single_quote_strings: true,
            decision_keywords: &["if", "for", "case", "select"],
            decision_operators: &["&&", "||"],
        }),
        (&[".rb"], LanguageSpec {
            name: "Ruby",
            line_comments: &["#"],
            block_comment: Some(("=begin", "=end")),
            single_quote_strings: true,
            decision_keywords: &["if", "elsif", "unless", "while", "until", "for", "when", "rescue", "and", "or"],
            decision_operators: &["&&", "||"],
        }),
        (&[".php"], LanguageSpec {
            name: "PHP",
            line_comments: &["//", "#"],
            block_comment: Some(("/*", "*/")),
            single_quote_strings: true,
            decision_keywords: &["if", "elseif", "for", "foreach", "while", "case", "catch"],
            decision_operators: C_LIKE_OPERATORS,
        }),
        (&[".sh", ".bash"], LanguageSpec {
            name: "Shell",
            line_comments: &["#"],
            block_comment: None,
            single_quote_strings: true,
            decision_keywords: &["if", "elif", "for", "while", "until", "case"],
            decision_operators: &["&&", "||"],
        }),
    ]
}

/// Compiled per-language state
#[derive(Debug)]
struct CompiledLanguage {
    spec: LanguageSpec,
    decisions: Option<Regex>,
}

impl CompiledLanguage {
    fn compile(spec: LanguageSpec) -> Self {
        let mut alternatives: Vec<String> = spec.decision_keywords
            .iter()
            .map(|kw| format!(r"\b{}\b", regex::escape(kw)))
            .collect();
        alternatives.extend(spec.decision_operators.iter().map(|op| regex::escape(op)));

        // Built from escaped literals, so compilation cannot fail
        let decisions = if alternatives.is_empty() {
            None
        } else {
            Regex::new(&alternatives.join("|")).ok()
        };

        Self { spec, decisions }
    }
}

/// Line breakdown and complexity of a single file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMeasure {
    pub lines: usize,
    pub code: usize,
    pub comments: usize,
    pub blank: usize,
    pub complexity: usize,
}

/// Extractor for languages with known comment and branching syntax
#[derive(Debug, Clone)]
pub struct SourceExtractor {
    languages: Arc<HashMap<String, Arc<CompiledLanguage>>>,
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor {
    /// Create an extractor with the built-in language table
    pub fn new() -> Self {
        let mut languages = HashMap::new();
        for (extensions, spec) in builtin_languages() {
            let compiled = Arc::new(CompiledLanguage::compile(spec));
            for ext in extensions {
                languages.insert(ext.to_string(), Arc::clone(&compiled));
            }
        }
        Self {
            languages: Arc::new(languages),
        }
    }

    /// Get supported file extensions
    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.languages.keys().map(|s| s.as_str()).collect();
        extensions.sort_unstable();
        extensions
    }

    /// Measure one file's content
    pub fn measure_content(&self, extension: &str, content: &str) -> Option<SourceMeasure> {
        let language = self.languages.get(&extension.to_lowercase())?;
        Some(measure_with(language, content))
    }

    fn measure_paths(&self, extension: &str, paths: &[PathBuf]) -> ExtractResult<MetricMap> {
        let language = self.languages
            .get(&extension.to_lowercase())
            .cloned()
            .ok_or_else(|| ExtractError::Parse(format!("no language registered for '{extension}'")))?;
        trace!("Measuring {} {} files", paths.len(), language.spec.name);

        let measures: Vec<SourceMeasure> = paths
            .par_iter()
            .map(|path| -> ExtractResult<SourceMeasure> {
                let bytes = fs::read(path).map_err(|e| ExtractError::io(path, e))?;
                if is_binary(&bytes) {
                    trace!("Skipping binary content in {}", path.display());
                    return Ok(SourceMeasure::default());
                }
                let content = String::from_utf8_lossy(&bytes);
                let mut measure = measure_with(&language, &content);
                measure.lines = count_lines(&bytes);
                Ok(measure)
            })
            .collect::<ExtractResult<_>>()?;

        let lines: usize = measures.iter().map(|m| m.lines).sum();
        let comments: usize = measures.iter().map(|m| m.comments).sum();
        let complexity: usize = measures.iter().map(|m| m.complexity).sum();
        let files = paths.len();

        let mut metrics = MetricMap::new();
        metrics.insert(NUMBER_OF_FILES.to_string(), files as f64);
        metrics.insert(LINES.to_string(), lines as f64);
        metrics.insert(SLOC.to_string(), measures.iter().map(|m| m.code).sum::<usize>() as f64);
        metrics.insert(COMMENTS.to_string(), comments as f64);
        metrics.insert(BLANK.to_string(), measures.iter().map(|m| m.blank).sum::<usize>() as f64);
        metrics.insert(CYCLOMATIC.to_string(), complexity as f64);
        metrics.insert(
            AVERAGE_CYCLOMATIC.to_string(),
            if files == 0 { 0.0 } else { complexity as f64 / files as f64 },
        );
        metrics.insert(
            COMMENT_RATIO.to_string(),
            if lines == 0 { 0.0 } else { comments as f64 / lines as f64 },
        );
        Ok(metrics)
    }
}

#[async_trait]
impl MetricExtractor for SourceExtractor {
    fn name(&self) -> &str {
        "source"
    }

    async fn analyze(&self, extension: &str, paths: &[PathBuf]) -> ExtractResult<MetricMap> {
        let this = self.clone();
        let extension = extension.to_string();
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || this.measure_paths(&extension, &paths)).await?
    }
}

/// Classify lines and count decisions for one file
fn measure_with(language: &CompiledLanguage, content: &str) -> SourceMeasure {
    let (stripped, comment_lines) = strip_comments_and_strings(&language.spec, content);

    let stripped_lines: Vec<&str> = stripped.split('\n').collect();

    let mut measure = SourceMeasure::default();
    for (index, original) in content.lines().enumerate() {
        let code = stripped_lines.get(index).copied().unwrap_or("");
        measure.lines += 1;
        if original.trim().is_empty() {
            measure.blank += 1;
        } else if code.trim().is_empty() && comment_lines.get(index).copied().unwrap_or(false) {
            measure.comments += 1;
        } else {
            measure.code += 1;
        }
    }

    let decisions = language.decisions
        .as_ref()
        .map(|re| re.find_iter(&stripped).count())
        .unwrap_or(0);
    measure.complexity = 1 + decisions;
    measure
}

/// Replace comments and string literal bodies with spaces, preserving line
/// structure; also report which lines contained comment text
fn strip_comments_and_strings(spec: &LanguageSpec, content: &str) -> (String, Vec<bool>) {
    let chars: Vec<char> = content.chars().collect();
    let mut result = String::with_capacity(content.len());
    let mut comment_lines = vec![false];
    let mut i = 0;

    let starts_with = |i: usize, token: &str| -> bool {
        let mut j = i;
        for t in token.chars() {
            if j >= chars.len() || chars[j] != t {
                return false;
            }
            j += 1;
        }
        true
    };

    while i < chars.len() {
        // Block comments
        if let Some((open, close)) = spec.block_comment {
            if starts_with(i, open) {
                let line = comment_lines.len() - 1;
                comment_lines[line] = true;
                i += open.chars().count();
                while i < chars.len() && !starts_with(i, close) {
                    if chars[i] == '\n' {
                        result.push('\n');
                        comment_lines.push(true);
                    }
                    i += 1;
                }
                i = (i + close.chars().count()).min(chars.len());
                continue;
            }
        }

        // Line comments
        if let Some(token) = spec.line_comments.iter().find(|t| starts_with(i, t)) {
            let line = comment_lines.len() - 1;
            comment_lines[line] = true;
            i += token.chars().count();
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let c = chars[i];
        if c == '"' || (c == '\'' && spec.single_quote_strings) {
            result.push(c);
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if chars[i] == '\n' {
                    result.push('\n');
                    comment_lines.push(false);
                }
                i += 1;
            }
            if i < chars.len() {
                result.push(c);
                i += 1;
            }
            continue;
        }

        if c == '\n' {
            comment_lines.push(false);
        }
        result.push(c);
        i += 1;
    }

    (result, comment_lines)
}
