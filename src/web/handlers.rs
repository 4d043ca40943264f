//! HTTP request handlers.

use super::AppState;
use crate::reports::{line_shares, lines_by_report_count, top_lines};

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;

pub async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================================
// Risk
// ============================================================================

pub async fn handle_get_risk(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.engine.risk_snapshot();
    Json(snapshot.entries().to_vec())
}

pub async fn handle_get_risk_groups(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.risk_snapshot().groups())
}

#[derive(Debug, Deserialize)]
pub struct SegmentsQuery {
    /// Comma separated segment ids.
    #[serde(default)]
    pub ids: String,
}

pub async fn handle_get_segments(
    State(state): State<AppState>,
    Query(query): Query<SegmentsQuery>,
) -> impl IntoResponse {
    let ids: Vec<&str> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    Json(state.engine.paint_segments(&ids))
}

// ============================================================================
// Reports
// ============================================================================

pub async fn handle_get_reports(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.current_reports().await)
}

#[derive(Debug, Deserialize)]
pub struct LinesQuery {
    pub top: Option<usize>,
}

pub async fn handle_get_report_lines(
    State(state): State<AppState>,
    Query(query): Query<LinesQuery>,
) -> impl IntoResponse {
    let reports = state.engine.current_reports().await;
    let groups = match query.top {
        Some(n) => top_lines(&reports, n),
        None => lines_by_report_count(&reports),
    };
    Json(line_shares(&groups))
}
