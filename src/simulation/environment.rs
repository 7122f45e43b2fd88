//! # Simulated environment
//!
//! Owns every in-process zone simulator, their register stores and the
//! shared outdoor temperature input fed by the live weather source.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::zone::{SimulatorConfig, ZoneSimulator};
use crate::domain::ZoneId;
use crate::modbus::RegisterStore;

/// Externally injected outdoor temperature, shared by all simulators.
#[derive(Debug, Clone, Default)]
pub struct OutdoorInput {
    inner: Arc<RwLock<Option<f64>>>,
}

impl OutdoorInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, outdoor_temp_c: f64) {
        *self.inner.write() = Some(outdoor_temp_c);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn get(&self) -> Option<f64> {
        *self.inner.read()
    }
}

/// Initial conditions of one simulated zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneSeed {
    pub zone_id: ZoneId,
    pub initial_temp_c: f64,
    pub initial_target_c: f64,
    pub initially_occupied: bool,
}

pub struct SimulatedEnvironment {
    outdoor: OutdoorInput,
    stores: BTreeMap<ZoneId, Arc<RegisterStore>>,
    simulators: Vec<ZoneSimulator>,
}

impl SimulatedEnvironment {
    pub fn new(config: &SimulatorConfig, zones: &[ZoneSeed]) -> anyhow::Result<Self> {
        let outdoor = OutdoorInput::new();
        let mut stores = BTreeMap::new();
        let mut simulators = Vec::with_capacity(zones.len());

        for seed in zones {
            let simulator = ZoneSimulator::new(config, seed, outdoor.clone())?;
            stores.insert(seed.zone_id, simulator.store());
            simulators.push(simulator);
        }

        Ok(Self {
            outdoor,
            stores,
            simulators,
        })
    }

    pub fn outdoor(&self) -> OutdoorInput {
        self.outdoor.clone()
    }

    pub fn store(&self, zone_id: ZoneId) -> Option<Arc<RegisterStore>> {
        self.stores.get(&zone_id).cloned()
    }

    pub fn stores(&self) -> &BTreeMap<ZoneId, Arc<RegisterStore>> {
        &self.stores
    }

    /// Start one tick loop per zone. Consumes the simulators; stores stay shared.
    pub fn spawn_all(&mut self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(zones = self.simulators.len(), "starting zone simulators");
        self.simulators
            .drain(..)
            .map(|simulator| simulator.spawn(shutdown.clone()))
            .collect()
    }
}
