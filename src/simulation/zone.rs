use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::environment::{OutdoorInput, ZoneSeed};
use super::thermal::{ThermalModelConfig, ZoneThermalModel};
use crate::controller::hysteresis::{HysteresisBand, HysteresisSwitch};
use crate::domain::{ConfigurationError, RegisterSnapshot, ZoneId};
use crate::modbus::{ProtocolError, RegisterStore};

/// Scripted occupancy change, applied once the simulator has run `at_tick` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupancyStep {
    pub at_tick: u64,
    pub occupied: bool,
}

/// How a simulator's occupancy flag evolves. Independent of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OccupancyModel {
    /// Keeps the zone's initial occupancy
    Static,
    /// Flips with the given probability on every tick
    Random {
        flip_probability: f64,
        /// Random seed for reproducibility (None = random)
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Fixed transitions, sorted by tick
    Scripted { steps: Vec<OccupancyStep> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub tick_seconds: f64,
    #[serde(flatten)]
    pub thermal: ThermalModelConfig,
    pub hysteresis_band_c: f64,
    /// Outdoor temperature used until a weather reading is injected
    pub default_outdoor_temp_c: f64,
    pub occupancy: OccupancyModel,
    /// Expose every simulated zone as a Modbus TCP slave
    #[serde(default)]
    pub serve_modbus: bool,
}

impl SimulatorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs_f64(self.tick_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.tick_seconds.is_finite() || self.tick_seconds <= 0.0 {
            return Err(ConfigurationError::Invalid(format!(
                "simulator.tick_seconds must be positive, got {}",
                self.tick_seconds
            )));
        }
        if !self.hysteresis_band_c.is_finite() || self.hysteresis_band_c < 0.0 {
            return Err(ConfigurationError::Invalid(
                "simulator.hysteresis_band_c must be a non-negative number".into(),
            ));
        }
        if !self.default_outdoor_temp_c.is_finite() {
            return Err(ConfigurationError::NonFinite {
                field: "simulator.default_outdoor_temp_c",
            });
        }
        if let OccupancyModel::Random { flip_probability, .. } = self.occupancy {
            if !(0.0..=1.0).contains(&flip_probability) {
                return Err(ConfigurationError::Invalid(format!(
                    "occupancy flip_probability must be within [0, 1], got {flip_probability}"
                )));
            }
        }
        self.thermal.validate()
    }
}

enum OccupancyDriver {
    Static,
    Random { probability: f64, rng: StdRng },
    Scripted { steps: Vec<OccupancyStep> },
}

impl OccupancyDriver {
    fn new(model: &OccupancyModel, zone_id: ZoneId) -> Self {
        match model {
            OccupancyModel::Static => OccupancyDriver::Static,
            OccupancyModel::Random {
                flip_probability,
                seed,
            } => {
                let rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(zone_id as u64)),
                    None => StdRng::from_entropy(),
                };
                OccupancyDriver::Random {
                    probability: *flip_probability,
                    rng,
                }
            }
            OccupancyModel::Scripted { steps } => {
                let mut steps = steps.clone();
                steps.sort_by_key(|s| s.at_tick);
                OccupancyDriver::Scripted { steps }
            }
        }
    }

    fn next(&mut self, tick: u64, current: bool) -> bool {
        match self {
            OccupancyDriver::Static => current,
            OccupancyDriver::Random { probability, rng } => {
                if rng.gen_bool(*probability) {
                    !current
                } else {
                    current
                }
            }
            OccupancyDriver::Scripted { steps } => steps
                .iter()
                .take_while(|s| s.at_tick <= tick)
                .last()
                .map_or(current, |s| s.occupied),
        }
    }
}

/// One zone's thermal simulation, publishing into its own register store.
pub struct ZoneSimulator {
    zone_id: ZoneId,
    model: ZoneThermalModel,
    switch: HysteresisSwitch,
    occupancy: OccupancyDriver,
    occupied: bool,
    outdoor: OutdoorInput,
    default_outdoor_temp_c: f64,
    store: Arc<RegisterStore>,
    tick: Duration,
    ticks: u64,
}

impl ZoneSimulator {
    pub fn new(config: &SimulatorConfig, seed: &ZoneSeed, outdoor: OutdoorInput) -> Result<Self, ProtocolError> {
        let band = HysteresisBand::new(config.hysteresis_band_c);
        let heater_on = band.decide(seed.initial_temp_c, seed.initial_target_c, false);
        let outdoor_temp = outdoor.get().unwrap_or(config.default_outdoor_temp_c);

        let store = RegisterStore::new(&RegisterSnapshot {
            current_temp: seed.initial_temp_c,
            target_temp: seed.initial_target_c,
            occupancy: seed.initially_occupied,
            heater_on,
        })?;

        let mut model = ZoneThermalModel::new(config.thermal, seed.initial_temp_c, outdoor_temp);
        model.set_heater(heater_on);

        Ok(Self {
            zone_id: seed.zone_id,
            model,
            switch: HysteresisSwitch::new(band, heater_on),
            occupancy: OccupancyDriver::new(&config.occupancy, seed.zone_id),
            occupied: seed.initially_occupied,
            outdoor,
            default_outdoor_temp_c: config.default_outdoor_temp_c,
            store: Arc::new(store),
            tick: config.tick(),
            ticks: 0,
        })
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn store(&self) -> Arc<RegisterStore> {
        self.store.clone()
    }

    /// Advance one tick and publish the result.
    pub fn tick(&mut self) -> Result<RegisterSnapshot, ProtocolError> {
        self.ticks += 1;

        let outdoor_temp = self.outdoor.get().unwrap_or(self.default_outdoor_temp_c);
        self.model.set_outdoor_temp(outdoor_temp);
        self.model.step(self.tick.as_secs_f64());

        self.occupied = self.occupancy.next(self.ticks, self.occupied);

        let target = self.store.target_temp();
        let heater_on = self.switch.update(self.model.current_temp_c(), target);
        self.model.set_heater(heater_on);

        self.store
            .publish(self.model.current_temp_c(), self.occupied, heater_on)?;

        debug!(
            zone_id = self.zone_id,
            tick = self.ticks,
            current_temp = self.model.current_temp_c(),
            target_temp = target,
            outdoor_temp,
            heater_on,
            occupied = self.occupied,
            "zone tick"
        );
        Ok(self.store.snapshot())
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(zone_id = self.zone_id, tick_ms = self.tick.as_millis() as u64, "zone simulator started");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        warn!(zone_id = self.zone_id, error = %e, "zone tick failed to publish");
                    }
                }
            }
        }
        info!(zone_id = self.zone_id, ticks = self.ticks, "zone simulator stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
