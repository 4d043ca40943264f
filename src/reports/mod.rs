//! Inspector sighting reports.

mod merge;
mod summary;
mod windows;

pub use merge::*;
pub use summary::*;
pub use windows::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a station, as used for a report's direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One sighting. Identity is (`station_id`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireReport", into = "WireReport")]
pub struct Report {
    pub station_id: String,
    pub station_name: String,
    /// Empty when the line is unknown.
    pub line: String,
    pub direction: Option<StationRef>,
    pub timestamp: DateTime<Utc>,
    pub is_historic: bool,
}

impl Report {
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.station_id, self.timestamp)
    }
}

/// Shape served by `/basics/inspectors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReport {
    timestamp: DateTime<Utc>,
    station: StationRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    direction: Option<StationRef>,
    #[serde(default)]
    line: Option<String>,
    #[serde(default)]
    is_historic: bool,
}

impl TryFrom<WireReport> for Report {
    type Error = String;

    fn try_from(wire: WireReport) -> Result<Self, Self::Error> {
        if wire.station.id.trim().is_empty() {
            return Err(format!("report at {} has no station id", wire.timestamp));
        }

        let direction = wire
            .direction
            .filter(|d| !d.id.is_empty() || !d.name.is_empty());

        Ok(Report {
            station_id: wire.station.id,
            station_name: wire.station.name,
            line: wire.line.unwrap_or_default(),
            direction,
            timestamp: wire.timestamp,
            is_historic: wire.is_historic,
        })
    }
}

impl From<Report> for WireReport {
    fn from(report: Report) -> Self {
        WireReport {
            timestamp: report.timestamp,
            station: StationRef {
                id: report.station_id,
                name: report.station_name,
            },
            direction: report.direction,
            line: Some(report.line),
            is_historic: report.is_historic,
        }
    }
}

#[cfg(test)]
pub(crate) fn report(station: &str, line: &str, minute: u32, historic: bool) -> Report {
    use chrono::TimeZone;

    Report {
        station_id: station.to_string(),
        station_name: format!("{} station", station),
        line: line.to_string(),
        direction: None,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
            + chrono::Duration::minutes(minute as i64),
        is_historic: historic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wire_report() {
        let json = r#"[
            {"timestamp":"2024-05-01T10:15:00Z",
             "station":{"id":"SU-A","name":"Alexanderplatz"},
             "direction":{"id":"SU-P","name":"Pankow"},
             "line":"U8","isHistoric":false},
            {"timestamp":"2024-05-01T09:00:00.000Z",
             "station":{"id":"SU-W","name":"Warschauer Str."},
             "direction":{"id":"","name":""},
             "line":null,"isHistoric":true}
        ]"#;

        let reports: Vec<Report> = serde_json::from_str(json).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].station_name, "Alexanderplatz");
        assert_eq!(reports[0].direction.as_ref().unwrap().name, "Pankow");
        assert_eq!(reports[1].line, "");
        assert!(reports[1].direction.is_none());
        assert!(reports[1].is_historic);
    }

    #[test]
    fn test_missing_station_id_is_rejected() {
        let json = r#"{"timestamp":"2024-05-01T10:15:00Z","station":{"id":"","name":"?"}}"#;
        assert!(serde_json::from_str::<Report>(json).is_err());
    }

    #[test]
    fn test_serializes_to_wire_shape() {
        let value = serde_json::to_value(report("SU-A", "U2", 0, true)).unwrap();
        assert_eq!(value["station"]["id"], "SU-A");
        assert_eq!(value["isHistoric"], true);
        assert!(value.get("direction").is_none());
    }
}
