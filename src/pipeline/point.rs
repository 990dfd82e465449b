//! Point pivot: rows sharing (commit, extension) become one flat record

use std::collections::HashMap;
use log::warn;
use serde::{Deserialize, Serialize};
use crate::scanner::messages::MetricMap;
use crate::store::MetricRow;

/// Field names a metric may not shadow in the flattened record
pub const RESERVED_FIELDS: [&str; 4] = ["repo_id", "commit_id", "commit_date", "file_extension"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub repo_id: i64,
    pub commit_id: String,
    /// Epoch milliseconds
    pub commit_date: i64,
    pub file_extension: String,
    #[serde(flatten)]
    pub metrics: MetricMap,
}

/// Pivot `rows` into points, in order of each (commit, extension)'s first row
pub fn pivot(rows: &[MetricRow]) -> Vec<Point> {
    let mut index: HashMap<(i64, &str, &str), usize> = HashMap::new();
    let mut points: Vec<Point> = Vec::new();

    for row in rows {
        if RESERVED_FIELDS.contains(&row.metric.as_str()) {
            warn!("Skipping metric '{}' of {}: name is reserved", row.metric, row.commit_id);
            continue;
        }

        let key = (row.repo_id, row.commit_id.as_str(), row.file_extension.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            points.push(Point {
                repo_id: row.repo_id,
                commit_id: row.commit_id.clone(),
                commit_date: row.commit_date,
                file_extension: row.file_extension.clone(),
                metrics: MetricMap::new(),
            });
            points.len() - 1
        });

        let point = &mut points[slot];
        if let Some(existing) = point.metrics.get(&row.metric) {
            if *existing != row.value {
                warn!(
                    "Conflicting values for {} {} '{}': keeping {}, ignoring {}",
                    row.commit_id, row.file_extension, row.metric, existing, row.value
                );
            }
            continue;
        }
        point.metrics.insert(row.metric.clone(), row.value);
    }

    points
}
