use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::engine::{HistoricalEngine, RunPlan};
use super::run::RunHandle;
use super::SimulationError;
use crate::domain::{GeoLocation, HistoricalDataPoint, HistoricalRun, RunId, RunSummary, ZoneId, ZonePreferences};
use crate::forecast::HistoricalWeatherSource;
use crate::repo::{PersistenceSink, RetentionPolicy};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunRequest {
    pub zone_id: ZoneId,
    pub preferences: ZonePreferences,
    pub location: GeoLocation,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Default)]
struct RunRegistry {
    order: VecDeque<RunId>,
    handles: HashMap<RunId, Arc<RunHandle>>,
}

impl RunRegistry {
    fn insert(&mut self, handle: Arc<RunHandle>) {
        self.order.push_back(handle.id());
        self.handles.insert(handle.id(), handle);
    }

    /// Forget the oldest finished runs beyond `max_runs`. Runs still in
    /// flight are never evicted.
    fn evict_finished(&mut self, max_runs: usize) {
        let mut excess = self.handles.len().saturating_sub(max_runs);
        let handles = &mut self.handles;
        self.order.retain(|run_id| {
            if excess == 0 {
                return true;
            }
            let finished = handles.get(run_id).map_or(true, |h| h.status().is_terminal());
            if finished {
                handles.remove(run_id);
                excess -= 1;
                debug!(%run_id, "evicted finished historical run");
            }
            !finished
        });
    }
}

/// Accepts historical runs and executes each on its own task.
pub struct HistoricalService {
    engine: Arc<HistoricalEngine>,
    weather: Arc<dyn HistoricalWeatherSource>,
    sink: Arc<dyn PersistenceSink>,
    max_runs: usize,
    runs: RwLock<RunRegistry>,
}

impl HistoricalService {
    pub fn new(
        engine: HistoricalEngine,
        weather: Arc<dyn HistoricalWeatherSource>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            weather,
            sink,
            max_runs: RetentionPolicy::default().max_historical_runs,
            runs: RwLock::new(RunRegistry::default()),
        }
    }

    /// Number of runs remembered before finished ones are forgotten.
    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = max_runs;
        self
    }

    /// Register a PENDING run and start it in the background. The returned
    /// handle resolves when the run reaches a terminal status.
    pub fn submit(self: &Arc<Self>, request: RunRequest) -> (RunId, JoinHandle<()>) {
        let run = HistoricalRun::new(request.zone_id, request.start, request.end);
        let handle = Arc::new(RunHandle::new(run));
        let run_id = handle.id();
        {
            let mut runs = self.runs.write();
            runs.insert(handle.clone());
            runs.evict_finished(self.max_runs);
        }
        info!(
            %run_id,
            zone_id = request.zone_id,
            start = %request.start,
            end = %request.end,
            "historical run submitted"
        );

        let service = self.clone();
        let task = tokio::spawn(async move { service.execute(handle, request).await });
        (run_id, task)
    }

    fn handle(&self, run_id: RunId) -> Option<Arc<RunHandle>> {
        self.runs.read().handles.get(&run_id).cloned()
    }

    pub fn status(&self, run_id: RunId) -> Option<HistoricalRun> {
        self.handle(run_id).map(|h| h.snapshot())
    }

    /// Points of a run: the live buffer while it runs, the sink afterwards.
    pub async fn points(&self, run_id: RunId) -> Result<Option<Vec<HistoricalDataPoint>>> {
        let Some(handle) = self.handle(run_id) else {
            return Ok(None);
        };
        if handle.is_persisted() {
            return Ok(Some(self.sink.historical_points(run_id).await?));
        }
        Ok(Some(handle.points()))
    }

    pub fn list(&self) -> Vec<HistoricalRun> {
        let mut runs: Vec<HistoricalRun> = self.runs.read().handles.values().map(|h| h.snapshot()).collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    async fn execute(&self, handle: Arc<RunHandle>, request: RunRequest) {
        if let Err(e) = handle.start() {
            error!(run_id = %handle.id(), error = %e, "historical run could not start");
            return;
        }

        let outcome = self.simulate(handle.clone(), request).await;

        let points = handle.points();
        match self.sink.record_historical_points(&points).await {
            Ok(()) => handle.release_points(),
            // Keep the buffer so the points stay queryable
            Err(e) => warn!(run_id = %handle.id(), error = %e, points = points.len(), "failed to persist historical points"),
        }

        let finished = match &outcome {
            Ok(summary) => {
                info!(
                    run_id = %handle.id(),
                    steps = summary.steps,
                    energy_kwh = summary.total_energy_kwh,
                    weighted_energy = summary.total_weighted_energy,
                    "historical run completed"
                );
                handle.complete()
            }
            Err(e) => {
                warn!(run_id = %handle.id(), error = %e, points = points.len(), "historical run failed");
                handle.fail(e)
            }
        };
        if let Err(e) = finished {
            error!(run_id = %handle.id(), error = %e, "historical run finished twice");
        }
    }

    async fn simulate(&self, handle: Arc<RunHandle>, request: RunRequest) -> Result<RunSummary, SimulationError> {
        if request.start > request.end {
            return Err(SimulationError::EmptyRange {
                start: request.start,
                end: request.end,
            });
        }
        let samples = self
            .weather
            .fetch_range(&request.location, request.start, request.end)
            .await?;

        let plan = RunPlan {
            run_id: handle.id(),
            zone_id: request.zone_id,
            preferences: request.preferences,
            start: request.start,
            end: request.end,
        };
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.simulate(&plan, &samples, |point| handle.append(point)))
            .await
            .map_err(|e| SimulationError::Aborted(e.to_string()))?
    }
}
