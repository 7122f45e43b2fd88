//! # Zone Simulation
//!
//! Stand-ins for the physical zones the controller talks to.
//!
//! - **Thermal**: first-order model, heater gain or passive drift toward outdoor
//! - **Zone**: per-zone tick loop with occupancy and hysteresis, publishing into a register store
//! - **Environment**: owns every zone simulator and the shared outdoor temperature input
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut env = SimulatedEnvironment::new(&config.simulator, &seeds)?;
//! let store = env.store(1).expect("zone 1");
//! let tasks = env.spawn_all(shutdown.clone());
//! ```

pub mod environment;
pub mod thermal;
pub mod zone;

pub use environment::{OutdoorInput, SimulatedEnvironment, ZoneSeed};
pub use thermal::{ThermalModelConfig, ZoneThermalModel, ZoneThermalState};
pub use zone::{OccupancyModel, OccupancyStep, SimulatorConfig, ZoneSimulator};
