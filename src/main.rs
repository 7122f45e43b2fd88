use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zone_heating_controller::{api, config::Config, controller, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;
    if cfg.zones.is_empty() {
        warn!("no zones configured, the control loop will idle");
    }

    let (app_state, runtime) = controller::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - the API is reachable from the network without authentication");
    }

    let shutdown = CancellationToken::new();
    let tasks = controller::spawn_controller_tasks(&app_state, runtime, shutdown.clone()).await?;

    info!(
        %addr,
        zones = cfg.zones.len(),
        transport = %cfg.controller.transport,
        "starting zone heating controller"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(telemetry::shutdown_signal(shutdown.clone()));
    if let Err(e) = server.await {
        warn!(error = %e, "http server stopped");
    }

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }

    info!("shutdown complete");
    Ok(())
}
