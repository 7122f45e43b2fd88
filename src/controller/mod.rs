pub mod decision;
pub mod hysteresis;
pub mod live;
pub mod scheduler;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::forecast::{OpenMeteoArchiveClient, WeatherApiClient};
use crate::hardware::LinkFactory;
use crate::historical::{HistoricalEngine, HistoricalService};
use crate::modbus::server::ZoneModbusServer;
use crate::pricing::{EnergyPricer, TimeOfUseTariff};
use crate::repo::Repositories;

pub use decision::{decide, ControlDecision, DecisionConfig, DecisionInput};
pub use hysteresis::{HysteresisBand, HysteresisSwitch};
pub use live::{ControlledZone, CycleReport, LiveControlLoop, LiveWeather, ZoneOutcome};
pub use scheduler::{TaskScheduler, TaskStatus};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub repos: Repositories,
    pub scheduler: Arc<TaskScheduler>,
    pub historical: Arc<HistoricalService>,
}

/// Zone-side tasks assembled with the state and started by
/// [`spawn_controller_tasks`].
pub struct ZoneRuntime {
    #[cfg(feature = "sim")]
    environment: crate::simulation::SimulatedEnvironment,
    slaves: Vec<(SocketAddr, Arc<ZoneModbusServer>)>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<(Self, ZoneRuntime)> {
        let repos = Repositories::in_memory(cfg.retention);
        for zone in &cfg.zones {
            repos
                .sink
                .put_preferences(zone.id, zone.preferences.clone())
                .await
                .with_context(|| format!("seeding preferences of zone {}", zone.id))?;
        }

        let timezone = cfg.controller.timezone()?;
        let pricer: Arc<dyn EnergyPricer> = Arc::new(TimeOfUseTariff::default());
        let factory = LinkFactory::new(cfg.controller.transport, cfg.controller.protocol_timeout());

        #[cfg(feature = "sim")]
        let environment = {
            let seeds: Vec<_> = cfg.zones.iter().map(|z| z.seed()).collect();
            crate::simulation::SimulatedEnvironment::new(&cfg.simulator, &seeds)?
        };

        let mut zones = Vec::with_capacity(cfg.zones.len());
        let mut slaves = Vec::new();
        for zone in &cfg.zones {
            #[cfg(feature = "sim")]
            let store = environment.store(zone.id);
            #[cfg(not(feature = "sim"))]
            let store = None;

            if cfg.simulator.serve_modbus {
                if let Some(store) = store.clone() {
                    let server = ZoneModbusServer::new(zone.id, zone.unit_id, store);
                    slaves.push((zone.socket_addr()?, Arc::new(server)));
                }
            }

            let master = factory
                .create_master(zone, store)
                .with_context(|| format!("creating register link for zone {}", zone.id))?;
            info!(zone_id = zone.id, name = %zone.name, endpoint = %master.endpoint(), "zone configured");
            zones.push(ControlledZone {
                master,
                default_preferences: zone.preferences.clone(),
            });
        }

        let mut control = LiveControlLoop::new(
            zones,
            cfg.decision.clone(),
            cfg.controller.target_write_tolerance_c,
            timezone,
            pricer.clone(),
            repos.sink.clone(),
        );
        if let Some(live) = &cfg.weather.live {
            let client = WeatherApiClient::new(live.base_url.clone(), live.api_key.clone(), cfg.weather.http_timeout())?;
            control = control.with_weather(LiveWeather {
                source: Arc::new(client),
                location: live.location.clone(),
            });
        }
        #[cfg(feature = "sim")]
        {
            control = control.with_outdoor_input(environment.outdoor());
        }

        let scheduler = Arc::new(TaskScheduler::new(Arc::new(control), cfg.controller.poll_interval()));

        let engine = HistoricalEngine::new(
            cfg.historical.clone(),
            cfg.simulator.thermal,
            cfg.decision.clone(),
            timezone,
            pricer,
        );
        let archive = OpenMeteoArchiveClient::new(cfg.weather.archive_base_url.clone(), cfg.weather.http_timeout())?;
        let historical = Arc::new(
            HistoricalService::new(engine, Arc::new(archive), repos.sink.clone())
                .with_max_runs(cfg.retention.max_historical_runs),
        );

        let state = Self {
            cfg: Arc::new(cfg),
            repos,
            scheduler,
            historical,
        };
        let runtime = ZoneRuntime {
            #[cfg(feature = "sim")]
            environment,
            slaves,
        };
        Ok((state, runtime))
    }

    pub fn control(&self) -> &Arc<LiveControlLoop> {
        self.scheduler.control()
    }
}

/// Bind the zone slaves, then start simulators and the control loop.
pub async fn spawn_controller_tasks(
    state: &AppState,
    runtime: ZoneRuntime,
    shutdown: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let mut tasks = Vec::new();

    for (addr, server) in runtime.slaves {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding modbus slave on {addr}"))?;
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener, shutdown).await {
                warn!(%addr, error = %e, "modbus slave stopped");
            }
        }));
    }

    #[cfg(feature = "sim")]
    {
        let mut environment = runtime.environment;
        tasks.extend(environment.spawn_all(shutdown.clone()));
    }

    tasks.push(state.scheduler.clone().start(shutdown));
    Ok(tasks)
}
