use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

use super::PersistenceSink;
use crate::domain::{Command, HistoricalDataPoint, RunId, SensorReading, ZoneId, ZonePreferences};

/// Upper bounds on what the in-memory store keeps. Oldest entries go first.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RetentionPolicy {
    pub max_readings_per_zone: usize,
    pub max_commands_per_zone: usize,
    /// Runs whose data points are kept, counted in flush order
    pub max_historical_runs: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            // one week at a 60 s poll
            max_readings_per_zone: 10_080,
            max_commands_per_zone: 5_000,
            max_historical_runs: 100,
        }
    }
}

#[derive(Debug, Default)]
struct RunPoints {
    order: VecDeque<RunId>,
    points: HashMap<RunId, Vec<HistoricalDataPoint>>,
}

/// Process-local store. Readings and commands are kept per zone in arrival
/// order; historical points per run.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    retention: RetentionPolicy,
    readings: RwLock<HashMap<ZoneId, VecDeque<SensorReading>>>,
    commands: RwLock<HashMap<ZoneId, VecDeque<Command>>>,
    points: RwLock<RunPoints>,
    preferences: RwLock<HashMap<ZoneId, ZonePreferences>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    pub fn reading_count(&self, zone_id: ZoneId) -> usize {
        self.readings.read().get(&zone_id).map_or(0, VecDeque::len)
    }

    pub fn retained_runs(&self) -> usize {
        self.points.read().order.len()
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}

#[async_trait]
impl PersistenceSink for InMemoryRepository {
    async fn record_reading(&self, reading: SensorReading) -> Result<()> {
        let mut readings = self.readings.write();
        let zone = readings.entry(reading.zone_id).or_default();
        push_capped(zone, reading, self.retention.max_readings_per_zone);
        Ok(())
    }

    async fn record_command(&self, command: Command) -> Result<()> {
        let mut commands = self.commands.write();
        let zone = commands.entry(command.zone_id).or_default();
        push_capped(zone, command, self.retention.max_commands_per_zone);
        Ok(())
    }

    async fn record_historical_points(&self, points: &[HistoricalDataPoint]) -> Result<()> {
        let mut store = self.points.write();
        let store = &mut *store;
        for point in points {
            if !store.points.contains_key(&point.run_id) {
                store.order.push_back(point.run_id);
            }
            store.points.entry(point.run_id).or_default().push(point.clone());
        }
        while store.order.len() > self.retention.max_historical_runs {
            if let Some(evicted) = store.order.pop_front() {
                store.points.remove(&evicted);
            }
        }
        Ok(())
    }

    async fn latest_reading(&self, zone_id: ZoneId) -> Result<Option<SensorReading>> {
        Ok(self
            .readings
            .read()
            .get(&zone_id)
            .and_then(|r| r.iter().max_by_key(|r| r.timestamp))
            .cloned())
    }

    async fn readings(&self, zone_id: ZoneId, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<SensorReading>> {
        let mut readings: Vec<SensorReading> = self
            .readings
            .read()
            .get(&zone_id)
            .map(|r| {
                r.iter()
                    .filter(|r| r.timestamp >= from && r.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    async fn commands(&self, zone_id: ZoneId, limit: usize) -> Result<Vec<Command>> {
        Ok(self
            .commands
            .read()
            .get(&zone_id)
            .map(|c| c.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn historical_points(&self, run_id: RunId) -> Result<Vec<HistoricalDataPoint>> {
        Ok(self.points.read().points.get(&run_id).cloned().unwrap_or_default())
    }

    async fn preferences(&self, zone_id: ZoneId) -> Result<Option<ZonePreferences>> {
        Ok(self.preferences.read().get(&zone_id).cloned())
    }

    async fn put_preferences(&self, zone_id: ZoneId, preferences: ZonePreferences) -> Result<()> {
        self.preferences.write().insert(zone_id, preferences);
        Ok(())
    }
}
