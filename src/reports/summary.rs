//! Per-line summaries of a merged report list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::Report;

/// Reports sharing one line, in the order they appeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineGroup {
    pub line: String,
    pub reports: Vec<Report>,
}

impl LineGroup {
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.reports.iter().map(|r| r.timestamp).max()
    }
}

/// A line's slice of all attributed reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineShare {
    pub line: String,
    pub reports: usize,
    pub share_percent: f64,
}

/// Group reports by line, busiest line first. Reports without a line are skipped.
pub fn lines_by_report_count(reports: &[Report]) -> Vec<LineGroup> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<LineGroup> = Vec::new();

    for report in reports.iter().filter(|r| !r.line.is_empty()) {
        match index.get(report.line.as_str()) {
            Some(&i) => groups[i].reports.push(report.clone()),
            None => {
                index.insert(&report.line, groups.len());
                groups.push(LineGroup {
                    line: report.line.clone(),
                    reports: vec![report.clone()],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.reports.len().cmp(&a.reports.len()));
    groups
}

/// The `n` busiest lines, most recently sighted first.
pub fn top_lines(reports: &[Report], n: usize) -> Vec<LineGroup> {
    let mut groups = lines_by_report_count(reports);
    groups.truncate(n);
    groups.sort_by(|a, b| b.latest().cmp(&a.latest()));
    groups
}

pub fn line_shares(groups: &[LineGroup]) -> Vec<LineShare> {
    let total: usize = groups.iter().map(|g| g.reports.len()).sum();

    groups
        .iter()
        .map(|g| LineShare {
            line: g.line.clone(),
            reports: g.reports.len(),
            share_percent: if total == 0 {
                0.0
            } else {
                g.reports.len() as f64 / total as f64 * 100.0
            },
        })
        .collect()
}

/// Whole minutes since the sighting; never negative.
pub fn elapsed_minutes(report: &Report, now: DateTime<Utc>) -> i64 {
    (now - report.timestamp).num_minutes().max(0)
}
