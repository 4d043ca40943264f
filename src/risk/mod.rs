//! Segment risk colors and per-line risk aggregation.

mod aggregate;
mod groups;

pub use aggregate::*;
pub use groups::*;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

pub const BAD_HEX: &str = "#A92725";
pub const MEDIUM_HEX: &str = "#F05044";
pub const OKAY_HEX: &str = "#FACB3F";
pub const NO_RISK_HEX: &str = "#13C184";

/// Color code attached to a segment by the risk model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RiskColor {
    NoRisk,
    Okay,
    Medium,
    Bad,
    /// Anything the model sent that we don't recognise, kept verbatim.
    Other(String),
}

impl RiskColor {
    pub fn parse(code: &str) -> Self {
        let code = code.trim();
        if code.eq_ignore_ascii_case(BAD_HEX) {
            RiskColor::Bad
        } else if code.eq_ignore_ascii_case(MEDIUM_HEX) {
            RiskColor::Medium
        } else if code.eq_ignore_ascii_case(OKAY_HEX) {
            RiskColor::Okay
        } else if code.eq_ignore_ascii_case(NO_RISK_HEX) {
            RiskColor::NoRisk
        } else {
            RiskColor::Other(code.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RiskColor::NoRisk => NO_RISK_HEX,
            RiskColor::Okay => OKAY_HEX,
            RiskColor::Medium => MEDIUM_HEX,
            RiskColor::Bad => BAD_HEX,
            RiskColor::Other(code) => code,
        }
    }

    /// bad=3, medium=2, okay=1, everything else 0.
    pub fn weight(&self) -> u32 {
        match self {
            RiskColor::Bad => 3,
            RiskColor::Medium => 2,
            RiskColor::Okay => 1,
            RiskColor::NoRisk | RiskColor::Other(_) => 0,
        }
    }
}

impl Serialize for RiskColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RiskColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(RiskColor::parse(&code))
    }
}

/// Line a segment belongs to: everything before the first `-`.
pub fn segment_line(segment_id: &str) -> &str {
    segment_id.split('-').next().unwrap_or(segment_id)
}

/// Segment id to color, in the order segments appeared on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentColorMap {
    segments: Vec<(String, RiskColor)>,
    positions: HashMap<String, usize>,
}

impl SegmentColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a segment's color. A repeated id keeps its original position.
    pub fn insert(&mut self, segment_id: impl Into<String>, color: RiskColor) {
        let segment_id = segment_id.into();
        match self.positions.get(&segment_id) {
            Some(&pos) => self.segments[pos].1 = color,
            None => {
                self.positions.insert(segment_id.clone(), self.segments.len());
                self.segments.push((segment_id, color));
            }
        }
    }

    pub fn get(&self, segment_id: &str) -> Option<&RiskColor> {
        self.positions
            .get(segment_id)
            .map(|&pos| &self.segments[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RiskColor)> {
        self.segments.iter().map(|(id, color)| (id.as_str(), color))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, RiskColor)> for SegmentColorMap {
    fn from_iter<I: IntoIterator<Item = (S, RiskColor)>>(iter: I) -> Self {
        let mut map = SegmentColorMap::new();
        for (id, color) in iter {
            map.insert(id, color);
        }
        map
    }
}

impl Serialize for SegmentColorMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.segments.iter().map(|(id, color)| (id, color)))
    }
}

struct SegmentColorMapVisitor;

impl<'de> Visitor<'de> for SegmentColorMapVisitor {
    type Value = SegmentColorMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of segment ids to color codes")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = SegmentColorMap::new();
        while let Some((id, color)) = access.next_entry::<String, RiskColor>()? {
            map.insert(id, color);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for SegmentColorMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SegmentColorMapVisitor)
    }
}

/// Body of the segment-colors resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentColorsPayload {
    pub segment_colors: SegmentColorMap,
}
