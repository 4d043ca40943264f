//! Configuration module.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

/// Upper bound for the prior-day window offsets: one year.
pub const MAX_WINDOW_HOURS: i64 = 24 * 365;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the sightings API (default: "http://localhost:8080")
    pub api_url: String,
    /// HTTP port for the JSON surface (default: 3000)
    pub http_port: u16,
    /// SQLite file for validators; empty keeps them in memory (default: "")
    pub db_path: String,
    /// Seconds between risk refreshes (default: 30)
    pub refresh_interval_secs: u64,
    /// Per-request timeout in seconds (default: 10)
    pub request_timeout_secs: u64,
    /// Prior-day window starts this many hours ago (default: 24)
    pub prior_day_start_hours: i64,
    /// Prior-day window ends this many hours ago (default: 1)
    pub prior_day_end_hours: i64,
    /// Lines to report even when the lines resource is unavailable
    pub known_lines: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            http_port: 3000,
            db_path: String::new(),
            refresh_interval_secs: 30,
            request_timeout_secs: 10,
            prior_day_start_hours: 24,
            prior_day_end_hours: 1,
            known_lines: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FF_API_URL`
    /// - `FF_HTTP_PORT`
    /// - `FF_DB_PATH`
    /// - `FF_REFRESH_INTERVAL_SECS`
    /// - `FF_REQUEST_TIMEOUT_SECS`
    /// - `FF_PRIOR_DAY_START_HOURS` / `FF_PRIOR_DAY_END_HOURS`
    /// - `FF_KNOWN_LINES`: comma separated, e.g. "U1,U2,S41"
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup("FF_API_URL") {
            if !url.trim().is_empty() {
                cfg.api_url = url.trim().trim_end_matches('/').to_string();
            }
        }

        if let Some(port) = lookup("FF_HTTP_PORT").and_then(|v| v.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("FF_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = lookup("FF_REFRESH_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            if secs > 0 {
                cfg.refresh_interval_secs = secs;
            }
        }

        if let Some(secs) = lookup("FF_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            if secs > 0 {
                cfg.request_timeout_secs = secs;
            }
        }

        let start = lookup("FF_PRIOR_DAY_START_HOURS").and_then(|v| v.parse::<i64>().ok());
        let end = lookup("FF_PRIOR_DAY_END_HOURS").and_then(|v| v.parse::<i64>().ok());
        let start = start.unwrap_or(cfg.prior_day_start_hours);
        let end = end.unwrap_or(cfg.prior_day_end_hours);
        if end >= 0 && start > end && start <= MAX_WINDOW_HOURS {
            cfg.prior_day_start_hours = start;
            cfg.prior_day_end_hours = end;
        } else {
            tracing::warn!(start, end, "ignoring invalid prior-day window");
        }

        if let Some(lines) = lookup("FF_KNOWN_LINES") {
            cfg.known_lines = lines
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }

        cfg
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn segments_locator(&self) -> String {
        format!("{}/v0/risk-prediction/segment-colors", self.api_url.trim_end_matches('/'))
    }

    pub fn lines_locator(&self) -> String {
        format!("{}/v0/lines", self.api_url.trim_end_matches('/'))
    }
}
