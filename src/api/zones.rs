use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use super::response::{list, ApiResponse};
use crate::controller::{AppState, ControlledZone, ZoneOutcome};
use crate::domain::{Command, CommandKind, CommandStatus, SensorReading, ZoneId, ZonePreferences};

const DEFAULT_COMMAND_LIMIT: usize = 50;
const MAX_COMMAND_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct ZoneSummary {
    pub id: ZoneId,
    pub name: String,
    pub endpoint: String,
    pub latest: Option<SensorReading>,
}

#[derive(Debug, Serialize)]
pub struct ZoneDetail {
    #[serde(flatten)]
    pub summary: ZoneSummary,
    pub preferences: ZonePreferences,
    pub last_outcome: Option<ZoneOutcome>,
}

fn controlled(state: &AppState, zone_id: ZoneId) -> Result<&ControlledZone, ApiError> {
    state
        .control()
        .zone(zone_id)
        .ok_or_else(|| ApiError::NotFound(format!("zone {zone_id}")))
}

async fn summary(state: &AppState, zone: &ControlledZone) -> Result<ZoneSummary, ApiError> {
    let id = zone.zone_id();
    Ok(ZoneSummary {
        id,
        name: state.cfg.zone(id).map(|z| z.name.clone()).unwrap_or_default(),
        endpoint: zone.master.endpoint(),
        latest: state.repos.sink.latest_reading(id).await?,
    })
}

async fn current_preferences(state: &AppState, zone: &ControlledZone) -> Result<ZonePreferences, ApiError> {
    Ok(state
        .repos
        .sink
        .preferences(zone.zone_id())
        .await?
        .unwrap_or_else(|| zone.default_preferences.clone()))
}

/// GET /zones
pub async fn list_zones(State(state): State<AppState>) -> Result<ApiResponse<Vec<ZoneSummary>>, ApiError> {
    let mut zones = Vec::with_capacity(state.control().zones().len());
    for zone in state.control().zones() {
        zones.push(summary(&state, zone).await?);
    }
    Ok(list(zones))
}

/// GET /zones/:id
pub async fn get_zone(
    State(state): State<AppState>,
    Path(zone_id): Path<ZoneId>,
) -> Result<ApiResponse<ZoneDetail>, ApiError> {
    let zone = controlled(&state, zone_id)?;
    let last_outcome = state
        .scheduler
        .last_cycle()
        .await
        .and_then(|cycle| cycle.outcome(zone_id).cloned());
    Ok(ApiResponse::success(ZoneDetail {
        summary: summary(&state, zone).await?,
        preferences: current_preferences(&state, zone).await?,
        last_outcome,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// GET /zones/:id/readings - defaults to the last 24 hours
pub async fn get_readings(
    State(state): State<AppState>,
    Path(zone_id): Path<ZoneId>,
    Query(q): Query<ReadingsQuery>,
) -> Result<ApiResponse<Vec<SensorReading>>, ApiError> {
    controlled(&state, zone_id)?;
    let to = q.to.unwrap_or_else(Utc::now);
    let from = q.from.unwrap_or(to - Duration::hours(24));
    if from > to {
        return Err(ApiError::BadRequest(format!("from {from} is after to {to}")));
    }
    Ok(list(state.repos.sink.readings(zone_id, from, to).await?))
}

#[derive(Debug, Deserialize)]
pub struct CommandsQuery {
    pub limit: Option<usize>,
}

/// GET /zones/:id/commands - newest first
pub async fn get_commands(
    State(state): State<AppState>,
    Path(zone_id): Path<ZoneId>,
    Query(q): Query<CommandsQuery>,
) -> Result<ApiResponse<Vec<Command>>, ApiError> {
    controlled(&state, zone_id)?;
    let limit = q.limit.unwrap_or(DEFAULT_COMMAND_LIMIT).min(MAX_COMMAND_LIMIT);
    Ok(list(state.repos.sink.commands(zone_id, limit).await?))
}

/// PUT /zones/:id/preferences - takes effect on the next control cycle
pub async fn put_preferences(
    State(state): State<AppState>,
    Path(zone_id): Path<ZoneId>,
    Json(mut preferences): Json<ZonePreferences>,
) -> Result<ApiResponse<ZonePreferences>, ApiError> {
    controlled(&state, zone_id)?;
    preferences.normalize();
    preferences.validate()?;
    state.repos.sink.put_preferences(zone_id, preferences.clone()).await?;
    info!(zone_id, "zone preferences updated");
    Ok(ApiResponse::success(preferences))
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub target_temp: f64,
}

/// POST /zones/:id/target - manual write, kept until the next cycle decides otherwise
pub async fn set_target(
    State(state): State<AppState>,
    Path(zone_id): Path<ZoneId>,
    Json(req): Json<TargetRequest>,
) -> Result<ApiResponse<Command>, ApiError> {
    let zone = controlled(&state, zone_id)?;
    let preferences = current_preferences(&state, zone).await?;
    if !(preferences.min_target_temp..=preferences.max_target_temp).contains(&req.target_temp) {
        return Err(ApiError::ValidationError(format!(
            "target {} outside [{}, {}]",
            req.target_temp, preferences.min_target_temp, preferences.max_target_temp
        )));
    }

    let result = zone.master.write_target_temp(req.target_temp).await;
    let heater_on = state
        .repos
        .sink
        .latest_reading(zone_id)
        .await?
        .is_some_and(|r| r.heater_on);
    let command = Command {
        zone_id,
        timestamp: Utc::now(),
        kind: CommandKind::SetTargetTemp,
        target_temp: req.target_temp,
        heater_on,
        status: if result.is_ok() {
            CommandStatus::Success
        } else {
            CommandStatus::Failed
        },
        detail: Some(match &result {
            Ok(()) => "manual".to_string(),
            Err(e) => format!("manual: {e}"),
        }),
    };
    state.repos.sink.record_command(command.clone()).await?;
    result?;

    info!(zone_id, target_temp = req.target_temp, "manual target written");
    Ok(ApiResponse::success(command))
}
