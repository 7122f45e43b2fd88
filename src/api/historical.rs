use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::response::{list, ApiResponse};
use crate::controller::AppState;
use crate::domain::{GeoLocation, HistoricalDataPoint, HistoricalRun, RunId, RunStatus, ZoneId, ZonePreferences};
use crate::historical::RunRequest;

/// Body of POST /historical/runs. Preferences and location default to the
/// zone's stored preferences and configured coordinates.
#[derive(Debug, Deserialize)]
pub struct SubmitRun {
    pub zone_id: ZoneId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub preferences: Option<ZonePreferences>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: RunId,
    pub status: RunStatus,
}

/// POST /historical/runs - returns as soon as the run is queued
pub async fn submit_run(
    State(state): State<AppState>,
    Json(req): Json<SubmitRun>,
) -> Result<ApiResponse<RunAccepted>, ApiError> {
    let zone = state
        .cfg
        .zone(req.zone_id)
        .ok_or_else(|| ApiError::NotFound(format!("zone {}", req.zone_id)))?;
    if req.start > req.end {
        return Err(ApiError::BadRequest(format!("start {} is after end {}", req.start, req.end)));
    }

    let mut preferences = match req.preferences {
        Some(preferences) => preferences,
        None => state
            .repos
            .sink
            .preferences(zone.id)
            .await?
            .unwrap_or_else(|| zone.preferences.clone()),
    };
    preferences.normalize();
    preferences.validate()?;

    let (run_id, _task) = state.historical.submit(RunRequest {
        zone_id: zone.id,
        preferences,
        location: req.location.unwrap_or_else(|| zone.location()),
        start: req.start,
        end: req.end,
    });
    let status = state
        .historical
        .status(run_id)
        .map(|run| run.status)
        .unwrap_or(RunStatus::Pending);
    Ok(ApiResponse::accepted(RunAccepted { run_id, status }))
}

/// GET /historical/runs
pub async fn list_runs(State(state): State<AppState>) -> ApiResponse<Vec<HistoricalRun>> {
    list(state.historical.list())
}

/// GET /historical/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Result<ApiResponse<HistoricalRun>, ApiError> {
    state
        .historical
        .status(run_id)
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))
}

/// GET /historical/runs/:id/points
pub async fn get_run_points(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Result<ApiResponse<Vec<HistoricalDataPoint>>, ApiError> {
    state
        .historical
        .points(run_id)
        .await?
        .map(list)
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))
}
