//! Per-line risk aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::{segment_line, SegmentColorMap};

/// Risk of one line. `class <= score`; both are 0 for a line with no colored segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineRisk {
    pub score: u32,
    pub class: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedLine {
    pub line: String,
    #[serde(flatten)]
    pub risk: LineRisk,
}

/// Lines ranked by score, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskSnapshot {
    entries: Vec<RankedLine>,
    computed_at: Option<DateTime<Utc>>,
}

impl RiskSnapshot {
    pub fn entries(&self) -> &[RankedLine] {
        &self.entries
    }

    /// `None` until the first refresh has been applied.
    pub fn computed_at(&self) -> Option<DateTime<Utc>> {
        self.computed_at
    }

    /// Risk of `line`; unknown lines are `{0, 0}`.
    pub fn get(&self, line: &str) -> LineRisk {
        self.entries
            .iter()
            .find(|e| e.line == line)
            .map(|e| e.risk)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregate segment colors into a ranked per-line snapshot.
///
/// Every line in `known_lines` appears exactly once, at `{0, 0}` if none of
/// its segments carried a color. Lines with equal score keep the order they
/// were first seen in: segment order first, then `known_lines` order.
pub fn aggregate(colors: &SegmentColorMap, known_lines: &BTreeSet<String>) -> RiskSnapshot {
    aggregate_at(colors, known_lines, Utc::now())
}

pub fn aggregate_at(
    colors: &SegmentColorMap,
    known_lines: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> RiskSnapshot {
    let mut entries: Vec<RankedLine> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (segment_id, color) in colors.iter() {
        let line = segment_line(segment_id);
        let weight = color.weight();
        let pos = match index.get(line) {
            Some(&pos) => pos,
            None => {
                index.insert(line.to_string(), entries.len());
                entries.push(RankedLine {
                    line: line.to_string(),
                    risk: LineRisk::default(),
                });
                entries.len() - 1
            }
        };
        let risk = &mut entries[pos].risk;
        risk.score += weight;
        risk.class = risk.class.max(weight);
    }

    for line in known_lines {
        if !index.contains_key(line.as_str()) {
            index.insert(line.clone(), entries.len());
            entries.push(RankedLine {
                line: line.clone(),
                risk: LineRisk::default(),
            });
        }
    }

    // sort_by is stable
    entries.sort_by(|a, b| b.risk.score.cmp(&a.risk.score));

    tracing::debug!(lines = entries.len(), segments = colors.len(), "aggregated line risk");

    RiskSnapshot {
        entries,
        computed_at: Some(now),
    }
}
