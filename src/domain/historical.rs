use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PriceLevel, ZoneId};

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// PENDING -> RUNNING -> {COMPLETED | FAILED}. A pending run may also
    /// fail directly when it cannot be started.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: usize,
    pub heater_on_steps: usize,
    pub total_energy_kwh: f64,
    pub total_weighted_energy: f64,
}

impl RunSummary {
    pub fn record(&mut self, point: &HistoricalDataPoint) {
        self.steps += 1;
        if point.heater_on {
            self.heater_on_steps += 1;
        }
        self.total_energy_kwh += point.energy_kwh;
        self.total_weighted_energy += point.estimated_energy_increment;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRun {
    pub id: RunId,
    pub zone_id: ZoneId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
}

impl HistoricalRun {
    pub fn new(zone_id: ZoneId, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            zone_id,
            start_time,
            end_time,
            status: RunStatus::Pending,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
            summary: RunSummary::default(),
        }
    }
}

/// One simulated step of a historical run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataPoint {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub simulated_temp: f64,
    pub target_temp: f64,
    pub heater_on: bool,
    pub occupancy: bool,
    pub outdoor_temp: f64,
    pub energy_price_level: PriceLevel,
    pub energy_kwh: f64,
    /// Energy of this step weighted by the price level (kWh x price per kWh)
    pub estimated_energy_increment: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_monotonic() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        for terminal in [Completed, Failed] {
            for next in [Pending, Running, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = HistoricalRun::new(3, Utc::now(), Utc::now());
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.error.is_none());
        assert!(!run.status.is_terminal());
    }
}
