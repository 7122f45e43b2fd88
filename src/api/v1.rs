use axum::{
    routing::{get, post, put},
    Router,
};

use super::{health, historical, zones};
use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/status", get(health::get_status))
        .route("/zones", get(zones::list_zones))
        .route("/zones/:id", get(zones::get_zone))
        .route("/zones/:id/readings", get(zones::get_readings))
        .route("/zones/:id/commands", get(zones::get_commands))
        .route("/zones/:id/preferences", put(zones::put_preferences))
        .route("/zones/:id/target", post(zones::set_target))
        .route(
            "/historical/runs",
            get(historical::list_runs).post(historical::submit_run),
        )
        .route("/historical/runs/:id", get(historical::get_run))
        .route("/historical/runs/:id/points", get(historical::get_run_points))
        .with_state(state)
}
