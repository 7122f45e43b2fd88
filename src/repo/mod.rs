//! Persistence sink for readings, commands, historical data points and
//! zone preferences.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{Command, HistoricalDataPoint, RunId, SensorReading, ZoneId, ZonePreferences};

pub mod memory;

pub use memory::{InMemoryRepository, RetentionPolicy};

/// Append-only record store. Each call is atomic per record; no transactions
/// span calls.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_reading(&self, reading: SensorReading) -> Result<()>;

    async fn record_command(&self, command: Command) -> Result<()>;

    async fn record_historical_points(&self, points: &[HistoricalDataPoint]) -> Result<()>;

    async fn latest_reading(&self, zone_id: ZoneId) -> Result<Option<SensorReading>>;

    /// Readings of a zone with `from <= timestamp <= to`, oldest first
    async fn readings(&self, zone_id: ZoneId, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<SensorReading>>;

    /// Most recent commands of a zone, newest first
    async fn commands(&self, zone_id: ZoneId, limit: usize) -> Result<Vec<Command>>;

    async fn historical_points(&self, run_id: RunId) -> Result<Vec<HistoricalDataPoint>>;

    async fn preferences(&self, zone_id: ZoneId) -> Result<Option<ZonePreferences>>;

    async fn put_preferences(&self, zone_id: ZoneId, preferences: ZonePreferences) -> Result<()>;
}

#[derive(Clone)]
pub struct Repositories {
    pub sink: Arc<dyn PersistenceSink>,
}

impl Repositories {
    pub fn in_memory(retention: RetentionPolicy) -> Self {
        Self {
            sink: Arc::new(InMemoryRepository::with_retention(retention)),
        }
    }
}
