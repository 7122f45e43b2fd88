//! Historical runs: the live control algorithm replayed against archived
//! weather, stepped as fast as the CPU allows.
//!
//! - [`run`]: the per-run state machine and its data-point buffer
//! - [`engine`]: the deterministic stepping loop
//! - [`service`]: submission, background execution and queries

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{ConfigurationError, RunId, RunStatus};
use crate::forecast::WeatherError;

pub mod engine;
pub mod run;
pub mod service;

pub use engine::{HistoricalEngine, HistoricalSettings, OccupancyRule, RunPlan};
pub use run::RunHandle;
pub use service::{HistoricalService, RunRequest};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("no historical weather sample at {0}")]
    DataGap(DateTime<Utc>),
    #[error("empty time range: {start} is after {end}")]
    EmptyRange { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Weather(#[from] WeatherError),
    #[error("invalid run transition {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
    #[error("run {0} is already finished")]
    Terminal(RunId),
    #[error("simulation aborted: {0}")]
    Aborted(String),
}
