//! External Analyser Extractor
//!
//! Delegates an extension group to an external program, e.g. a radon-based
//! script for Python. The command receives the group's absolute paths as
//! trailing arguments and must print one JSON object on stdout; every numeric
//! leaf becomes a metric, with nested object keys joined by `.`.
//!
//! Per-file and per-block output is summed into group totals: leaves inside
//! arrays add up under the array's key, and a top-level key naming one of the
//! analysed files contributes to the group root. Radon's
//! `{"/src/a.py": [{"complexity": 3, ...}]}` therefore becomes `complexity`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio::process::Command;
use crate::scanner::messages::MetricMap;
use super::error::{ExtractError, ExtractResult};
use super::{MetricExtractor, NUMBER_OF_FILES};

/// Runs a configured command line for one extension group
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    command_line: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExtractor {
    /// Split `command_line` on whitespace; quoting is not interpreted
    pub fn new(command_line: &str, timeout: Duration) -> ExtractResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ExtractError::command(command_line, "empty command line"))?;

        Ok(Self {
            command_line: command_line.to_string(),
            program,
            args: parts.collect(),
            timeout,
        })
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

#[async_trait]
impl MetricExtractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.command_line
    }

    async fn analyze(&self, extension: &str, paths: &[PathBuf]) -> ExtractResult<MetricMap> {
        debug!("Running '{}' on {} {} files", self.command_line, paths.len(), extension);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(paths)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ExtractError::Timeout {
                command: self.command_line.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ExtractError::command(&self.command_line, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::command(
                &self.command_line,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        let mut metrics = parse_metrics(&output.stdout, paths)?;
        metrics.entry(NUMBER_OF_FILES.to_string()).or_insert(paths.len() as f64);
        Ok(metrics)
    }
}

/// Flatten a JSON object's numeric leaves into a metric map for `paths`
pub fn parse_metrics(stdout: &[u8], paths: &[PathBuf]) -> ExtractResult<MetricMap> {
    let value: Value = serde_json::from_slice(stdout)
        .map_err(|e| ExtractError::Parse(e.to_string()))?;

    if !value.is_object() {
        return Err(ExtractError::Parse("expected a JSON object of metrics".to_string()));
    }

    let mut metrics = MetricMap::new();
    if let Value::Object(object) = &value {
        for (key, child) in object {
            let prefix = if names_analysed_file(key, paths) { String::new() } else { key.clone() };
            flatten_into(&mut metrics, prefix, child);
        }
    }
    Ok(metrics)
}

fn names_analysed_file(key: &str, paths: &[PathBuf]) -> bool {
    let key = Path::new(key);
    paths.iter().any(|path| path == key)
}

/// Object keys join with `.`; array elements and repeated keys sum
fn flatten_into(metrics: &mut MetricMap, prefix: String, value: &Value) {
    match value {
        Value::Object(object) => {
            for (key, child) in object {
                let name = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(metrics, name, child);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(metrics, prefix.clone(), item);
            }
        }
        Value::Number(number) => {
            if let Some(n) = number.as_f64() {
                *metrics.entry(prefix).or_insert(0.0) += n;
            }
        }
        Value::Bool(flag) => {
            *metrics.entry(prefix).or_insert(0.0) += if *flag { 1.0 } else { 0.0 };
        }
        // Strings and nulls carry no metric
        Value::String(_) | Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_object() {
        let metrics = parse_metrics(br#"{"mi": 71.5, "loc": 120, "label": "A"}"#, &[]).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["mi"], 71.5);
        assert_eq!(metrics["loc"], 120.0);
    }

    #[test]
    fn test_parse_nested_object() {
        let metrics = parse_metrics(br#"{"halstead": {"volume": 10.0, "effort": 2}, "ok": true}"#, &[]).unwrap();
        assert_eq!(metrics["halstead.volume"], 10.0);
        assert_eq!(metrics["halstead.effort"], 2.0);
        assert_eq!(metrics["ok"], 1.0);
    }

    #[test]
    fn test_parse_radon_complexity_output() {
        let paths = vec![PathBuf::from("/src/a.py"), PathBuf::from("/src/b.py")];
        let stdout = br#"{
            "/src/a.py": [
                {"type": "function", "rank": "A", "name": "f", "complexity": 3, "closures": []},
                {"type": "class", "rank": "B", "name": "C", "complexity": 6,
                 "methods": [{"type": "method", "rank": "A", "name": "m", "complexity": 2}]}
            ],
            "/src/b.py": [
                {"type": "function", "rank": "A", "name": "g", "complexity": 1}
            ]
        }"#;

        let metrics = parse_metrics(stdout, &paths).unwrap();

        assert_eq!(metrics["complexity"], 10.0);
        assert_eq!(metrics["methods.complexity"], 2.0);
        assert!(!metrics.keys().any(|key| key.contains("/src/")));
    }

    #[test]
    fn test_array_values_sum_under_their_key() {
        let metrics = parse_metrics(br#"{"scores": [1, 2, 3.5], "unknown.py": [{"loc": 4}]}"#, &[]).unwrap();
        assert_eq!(metrics["scores"], 6.5);
        // Keys that are not analysed files keep their prefix
        assert_eq!(metrics["unknown.py.loc"], 4.0);
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(parse_metrics(b"[1, 2]", &[]), Err(ExtractError::Parse(_))));
        assert!(matches!(parse_metrics(b"not json", &[]), Err(ExtractError::Parse(_))));
    }

    #[test]
    fn test_empty_command_line_rejected() {
        assert!(CommandExtractor::new("   ", Duration::from_secs(1)).is_err());
        let extractor = CommandExtractor::new("python3 analyse.py --json", Duration::from_secs(1)).unwrap();
        assert_eq!(extractor.program, "python3");
        assert_eq!(extractor.args, vec!["analyse.py".to_string(), "--json".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_command_and_adds_file_count() {
        let extractor = CommandExtractor::new(r#"echo {"complexity":3}"#, Duration::from_secs(10)).unwrap();
        // echo prints its arguments, so the paths end up after the JSON; use none
        let metrics = extractor.analyze(".py", &[]).await.unwrap();
        assert_eq!(metrics["complexity"], 3.0);
        assert_eq!(metrics[NUMBER_OF_FILES], 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_an_error() {
        let extractor = CommandExtractor::new("false", Duration::from_secs(10)).unwrap();
        let result = extractor.analyze(".py", &[]).await;
        assert!(matches!(result, Err(ExtractError::Command { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let extractor = CommandExtractor::new("sleep 5", Duration::from_millis(100)).unwrap();
        let result = extractor.analyze(".py", &[]).await;
        assert!(matches!(result, Err(ExtractError::Timeout { .. })));
    }
}
