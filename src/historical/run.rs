use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use super::SimulationError;
use crate::domain::{HistoricalDataPoint, HistoricalRun, RunId, RunStatus};

struct RunState {
    run: HistoricalRun,
    points: Vec<HistoricalDataPoint>,
    persisted: bool,
}

/// Shared handle to one run. Status only moves forward, and points are
/// accepted only while the run is RUNNING. Once the points are persisted
/// the buffer is released and the sink is their only copy.
pub struct RunHandle {
    id: RunId,
    state: RwLock<RunState>,
}

impl RunHandle {
    pub fn new(run: HistoricalRun) -> Self {
        Self {
            id: run.id,
            state: RwLock::new(RunState {
                run,
                points: Vec::new(),
                persisted: false,
            }),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn status(&self) -> RunStatus {
        self.state.read().run.status
    }

    pub fn snapshot(&self) -> HistoricalRun {
        self.state.read().run.clone()
    }

    pub fn points(&self) -> Vec<HistoricalDataPoint> {
        self.state.read().points.clone()
    }

    pub fn is_persisted(&self) -> bool {
        self.state.read().persisted
    }

    /// Drop the buffered points after they reached the sink.
    pub fn release_points(&self) {
        let mut state = self.state.write();
        state.points = Vec::new();
        state.persisted = true;
    }

    pub fn start(&self) -> Result<(), SimulationError> {
        self.transition(RunStatus::Running, None)
    }

    pub fn complete(&self) -> Result<(), SimulationError> {
        self.transition(RunStatus::Completed, None)
    }

    pub fn fail(&self, error: &SimulationError) -> Result<(), SimulationError> {
        self.transition(RunStatus::Failed, Some(error.to_string()))
    }

    fn transition(&self, next: RunStatus, error: Option<String>) -> Result<(), SimulationError> {
        let mut state = self.state.write();
        let current = state.run.status;
        if current.is_terminal() {
            return Err(SimulationError::Terminal(self.id));
        }
        if !current.can_transition_to(next) {
            return Err(SimulationError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        state.run.status = next;
        state.run.error = error;
        if next.is_terminal() {
            state.run.finished_at = Some(Utc::now());
        }
        info!(
            run_id = %self.id,
            zone_id = state.run.zone_id,
            from = %current,
            to = %next,
            steps = state.run.summary.steps,
            "historical run transition"
        );
        Ok(())
    }

    pub fn append(&self, point: HistoricalDataPoint) -> Result<(), SimulationError> {
        let mut state = self.state.write();
        match state.run.status {
            RunStatus::Running => {}
            status if status.is_terminal() => return Err(SimulationError::Terminal(self.id)),
            status => {
                return Err(SimulationError::InvalidTransition {
                    from: status,
                    to: RunStatus::Running,
                })
            }
        }
        if state.persisted {
            return Err(SimulationError::Terminal(self.id));
        }
        state.run.summary.record(&point);
        state.points.push(point);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceLevel;

    fn handle() -> RunHandle {
        RunHandle::new(HistoricalRun::new(1, Utc::now(), Utc::now()))
    }

    fn point(run_id: RunId) -> HistoricalDataPoint {
        HistoricalDataPoint {
            run_id,
            timestamp: Utc::now(),
            simulated_temp: 19.0,
            target_temp: 21.0,
            heater_on: true,
            occupancy: true,
            outdoor_temp: 2.0,
            energy_price_level: PriceLevel::Standard,
            energy_kwh: 2.0,
            estimated_energy_increment: 0.36,
        }
    }

    #[test]
    fn test_happy_path() {
        let run = handle();
        assert!(run.append(point(run.id())).is_err());
        run.start().unwrap();
        run.append(point(run.id())).unwrap();
        run.complete().unwrap();

        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert!(snapshot.finished_at.is_some());
        assert_eq!(snapshot.summary.steps, 1);
        assert_eq!(snapshot.summary.total_energy_kwh, 2.0);
    }

    #[test]
    fn test_terminal_is_final() {
        let run = handle();
        run.start().unwrap();
        run.append(point(run.id())).unwrap();
        run.fail(&SimulationError::Aborted("boom".into())).unwrap();

        assert_eq!(run.append(point(run.id())), Err(SimulationError::Terminal(run.id())));
        assert_eq!(run.complete(), Err(SimulationError::Terminal(run.id())));
        assert_eq!(run.start(), Err(SimulationError::Terminal(run.id())));

        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, RunStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("simulation aborted: boom"));
        assert_eq!(run.points().len(), 1);
    }

    #[test]
    fn test_released_points_keep_summary() {
        let run = handle();
        run.start().unwrap();
        run.append(point(run.id())).unwrap();
        run.append(point(run.id())).unwrap();
        run.release_points();

        assert!(run.is_persisted());
        assert!(run.points().is_empty());
        assert_eq!(run.snapshot().summary.steps, 2);
        assert!(run.append(point(run.id())).is_err());
        run.complete().unwrap();
    }

    #[test]
    fn test_cannot_complete_without_running() {
        let run = handle();
        assert_eq!(
            run.complete(),
            Err(SimulationError::InvalidTransition {
                from: RunStatus::Pending,
                to: RunStatus::Completed
            })
        );
        assert_eq!(run.status(), RunStatus::Pending);
    }
}
