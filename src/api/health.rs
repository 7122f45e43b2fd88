use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use super::response::ApiResponse;
use crate::controller::{AppState, CycleReport, TaskStatus};
use crate::hardware::Transport;

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub zones: usize,
    pub transport: Transport,
    pub simulated: bool,
    pub control_loop: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
    pub historical_runs: usize,
}

/// GET /status - control loop health and the most recent cycle
pub async fn get_status(State(state): State<AppState>) -> ApiResponse<SystemStatus> {
    ApiResponse::success(SystemStatus {
        zones: state.cfg.zones.len(),
        transport: state.cfg.controller.transport,
        simulated: cfg!(feature = "sim"),
        control_loop: state.scheduler.get_control_status().await,
        last_cycle: state.scheduler.last_cycle().await,
        historical_runs: state.historical.list().len(),
    })
}
