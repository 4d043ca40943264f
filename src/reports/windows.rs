//! Locators for the report time windows.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::config::{EngineConfig, MAX_WINDOW_HOURS};
use crate::fetch::CachePolicy;

pub const RECENT_KEY: &str = "inspectors:recent";
pub const PRIOR_DAY_KEY: &str = "inspectors:prior-day";

/// One windowed report query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub key: String,
    pub locator: String,
    pub policy: CachePolicy,
}

impl ReportQuery {
    pub fn new(key: impl Into<String>, locator: impl Into<String>, policy: CachePolicy) -> Self {
        Self {
            key: key.into(),
            locator: locator.into(),
            policy,
        }
    }
}

/// The recent and prior-day queries for a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWindows {
    pub recent: ReportQuery,
    pub prior_day: ReportQuery,
}

impl ReportWindows {
    pub fn at(now: DateTime<Utc>, cfg: &EngineConfig) -> Self {
        let base = format!("{}/basics/inspectors", cfg.api_url.trim_end_matches('/'));

        let start = hours_before(now, cfg.prior_day_start_hours);
        let end = hours_before(now, cfg.prior_day_end_hours);
        let prior_locator = format!(
            "{}?start={}&end={}",
            base,
            start.to_rfc3339_opts(SecondsFormat::Millis, true),
            end.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        Self {
            recent: ReportQuery::new(RECENT_KEY, base, CachePolicy::Revalidate),
            // The prior-day window moves with every call; caching it buys nothing.
            prior_day: ReportQuery::new(PRIOR_DAY_KEY, prior_locator, CachePolicy::NoStore),
        }
    }
}

/// `now` minus `hours`, clamped to `0..=MAX_WINDOW_HOURS`.
fn hours_before(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    Duration::try_hours(hours.clamp(0, MAX_WINDOW_HOURS))
        .and_then(|offset| now.checked_sub_signed(offset))
        .unwrap_or(now)
}
