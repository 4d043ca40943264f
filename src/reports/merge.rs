//! Temporal merge of the recent, historic and prior-day report windows.

use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::ops::Deref;

use super::Report;

/// Result of [`merge`]: live sightings, then the historic overlay, then the
/// prior-day window. Derefs to the concatenated, duplicate-free sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedReports {
    reports: Vec<Report>,
    live_len: usize,
    historic_len: usize,
}

impl MergedReports {
    pub fn live(&self) -> &[Report] {
        &self.reports[..self.live_len]
    }

    pub fn historic(&self) -> &[Report] {
        &self.reports[self.live_len..self.live_len + self.historic_len]
    }

    pub fn prior_day(&self) -> &[Report] {
        &self.reports[self.live_len + self.historic_len..]
    }

    pub fn into_vec(self) -> Vec<Report> {
        self.reports
    }
}

impl Deref for MergedReports {
    type Target = [Report];

    fn deref(&self) -> &[Report] {
        &self.reports
    }
}

impl Serialize for MergedReports {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.reports.serialize(serializer)
    }
}

/// The recent-window argument of [`merge`].
///
/// A plain list is split on `is_historic`; an earlier merge result keeps its
/// buckets, which is what makes re-merging a no-op.
#[derive(Debug, Clone)]
pub enum RecentWindow {
    Reports(Vec<Report>),
    Merged(MergedReports),
}

impl From<Vec<Report>> for RecentWindow {
    fn from(reports: Vec<Report>) -> Self {
        RecentWindow::Reports(reports)
    }
}

impl From<&[Report]> for RecentWindow {
    fn from(reports: &[Report]) -> Self {
        RecentWindow::Reports(reports.to_vec())
    }
}

impl From<MergedReports> for RecentWindow {
    fn from(merged: MergedReports) -> Self {
        RecentWindow::Merged(merged)
    }
}

/// Merge the three report windows into one ordered, duplicate-free list.
///
/// Carve-out reports join the historic bucket after the recent window's own
/// historic reports. Historic reports in the prior-day window are dropped.
/// Buckets are sorted newest first (ties on `station_id` ascending) and the
/// first occurrence of each (`station_id`, `timestamp`) wins.
pub fn merge(
    recent: impl Into<RecentWindow>,
    historic_carve_out: &[Report],
    prior_day: &[Report],
) -> MergedReports {
    let (mut live, mut historic, mut earlier) = match recent.into() {
        RecentWindow::Reports(reports) => {
            let (historic, live): (Vec<_>, Vec<_>) =
                reports.into_iter().partition(|r| r.is_historic);
            (live, historic, Vec::new())
        }
        RecentWindow::Merged(merged) => {
            let MergedReports {
                mut reports,
                live_len,
                historic_len,
            } = merged;
            let earlier = reports.split_off(live_len + historic_len);
            let historic = reports.split_off(live_len);
            (reports, historic, earlier)
        }
    };

    historic.extend_from_slice(historic_carve_out);
    earlier.extend(prior_day.iter().filter(|r| !r.is_historic).cloned());

    for bucket in [&mut live, &mut historic, &mut earlier] {
        sort_newest_first(bucket);
    }

    let mut seen = HashSet::new();
    let mut keep = |bucket: Vec<Report>| -> Vec<Report> {
        bucket
            .into_iter()
            .filter(|r| seen.insert((r.station_id.clone(), r.timestamp)))
            .collect()
    };
    let live = keep(live);
    let historic = keep(historic);
    let earlier = keep(earlier);

    let live_len = live.len();
    let historic_len = historic.len();
    let mut reports = live;
    reports.extend(historic);
    reports.extend(earlier);

    MergedReports {
        reports,
        live_len,
        historic_len,
    }
}

fn sort_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::report;

    fn keys(reports: &[Report]) -> Vec<(String, u32)> {
        reports
            .iter()
            .map(|r| {
                let base = report("x", "", 0, false).timestamp;
                (r.station_id.clone(), (r.timestamp - base).num_minutes() as u32)
            })
            .collect()
    }

    fn sample() -> (Vec<Report>, Vec<Report>, Vec<Report>) {
        let recent = vec![
            report("A", "U8", 50, false),
            report("H1", "S7", 5, true),
            report("B", "U2", 55, false),
            report("H2", "S7", 20, true),
        ];
        let carve_out = vec![report("H3", "U1", 10, true), report("H1", "S7", 5, true)];
        let prior_day = vec![
            report("C", "U8", 1, false),
            report("H2", "S7", 20, true),
            report("D", "U5", 3, false),
            report("B", "U2", 55, false),
        ];
        (recent, carve_out, prior_day)
    }

    #[test]
    fn test_bucket_order() {
        let (recent, carve_out, prior_day) = sample();
        let merged = merge(recent, &carve_out, &prior_day);

        assert_eq!(
            keys(&merged),
            vec![
                ("B".to_string(), 55),
                ("A".to_string(), 50),
                ("H2".to_string(), 20),
                ("H3".to_string(), 10),
                ("H1".to_string(), 5),
                ("D".to_string(), 3),
                ("C".to_string(), 1),
            ]
        );
        assert_eq!(merged.live().len(), 2);
        assert_eq!(merged.historic().len(), 3);
        assert_eq!(merged.prior_day().len(), 2);
    }

    #[test]
    fn test_no_duplicates() {
        let (recent, carve_out, prior_day) = sample();
        let mut doubled = recent.clone();
        doubled.extend(recent);
        let merged = merge(doubled, &carve_out, &prior_day);

        let mut seen = HashSet::new();
        for r in merged.iter() {
            assert!(seen.insert(r.key()), "duplicate {:?}", r.key());
        }
    }

    #[test]
    fn test_historic_precedence() {
        let mut in_recent = report("H", "S1", 30, true);
        in_recent.station_name = "from recent".to_string();
        let mut in_prior = in_recent.clone();
        in_prior.station_name = "from prior day".to_string();
        let mut in_carve_out = in_recent.clone();
        in_carve_out.station_name = "from carve-out".to_string();

        let merged = merge(vec![in_recent], &[in_carve_out], &[in_prior]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.historic()[0].station_name, "from recent");
    }

    #[test]
    fn test_idempotent() {
        let (recent, carve_out, prior_day) = sample();
        let once = merge(recent, &carve_out, &prior_day);
        let twice = merge(once.clone(), &[], &[]);
        assert_eq!(once, twice);
        assert_eq!(twice.live(), once.live());
        assert_eq!(twice.prior_day(), once.prior_day());
    }

    #[test]
    fn test_ties_break_on_station_id() {
        let merged = merge(
            vec![report("Z", "U1", 7, false), report("M", "U1", 7, false)],
            &[],
            &[],
        );
        assert_eq!(merged[0].station_id, "M");
        assert_eq!(merged[1].station_id, "Z");
    }

    #[test]
    fn test_empty_inputs() {
        let merged = merge(Vec::<Report>::new(), &[], &[]);
        assert!(merged.is_empty());
        assert!(merged.live().is_empty() && merged.prior_day().is_empty());

        let none: &[Report] = &[];
        let prior_only = merge(none, &[], &[report("C", "U8", 1, false)]);
        assert_eq!(prior_only.prior_day().len(), 1);
    }

    #[test]
    fn test_serializes_as_flat_list() {
        let (recent, carve_out, prior_day) = sample();
        let merged = merge(recent, &carve_out, &prior_day);
        let value = serde_json::to_value(&merged).unwrap();
        assert_eq!(value.as_array().unwrap().len(), merged.len());
    }
}
