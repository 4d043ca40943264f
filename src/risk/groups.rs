//! Presentation helpers over a [`RiskSnapshot`].

use serde::Serialize;

use super::{RankedLine, RiskColor, RiskSnapshot, SegmentColorMap, NO_RISK_HEX};

/// Lines bucketed by class, each bucket in ranked order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskGroups {
    /// Class 2 or 3.
    pub severe: Vec<RankedLine>,
    /// Class 1.
    pub elevated: Vec<RankedLine>,
    /// Class 0.
    pub calm: Vec<RankedLine>,
}

impl RiskSnapshot {
    pub fn groups(&self) -> RiskGroups {
        let mut groups = RiskGroups::default();
        for entry in self.entries() {
            let bucket = match entry.risk.class {
                0 => &mut groups.calm,
                1 => &mut groups.elevated,
                _ => &mut groups.severe,
            };
            bucket.push(entry.clone());
        }
        groups
    }
}

/// A geometry segment with the color it should be drawn in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaintedSegment {
    pub segment_id: String,
    pub color: String,
}

/// Color each segment; segments without an entry, or every segment while no
/// color map has loaded, get the no-risk color.
pub fn paint_segments<S: AsRef<str>>(
    segment_ids: &[S],
    colors: Option<&SegmentColorMap>,
) -> Vec<PaintedSegment> {
    segment_ids
        .iter()
        .map(|id| {
            let id = id.as_ref();
            let color = colors
                .and_then(|map| map.get(id))
                .map(RiskColor::as_str)
                .unwrap_or(NO_RISK_HEX);
            PaintedSegment {
                segment_id: id.to_string(),
                color: color.to_string(),
            }
        })
        .collect()
}
