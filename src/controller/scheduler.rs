use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::live::{CycleReport, LiveControlLoop, ZoneOutcome};

/// Task status tracking
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl TaskStatus {
    fn record(&mut self, report: &CycleReport) {
        self.last_run = Some(report.at);
        self.run_count += 1;

        let problems: Vec<String> = report
            .zones
            .iter()
            .filter_map(|(zone_id, outcome)| match outcome {
                ZoneOutcome::Decided { .. } => None,
                ZoneOutcome::Skipped { reason } => Some(format!("zone {zone_id} skipped: {reason}")),
                ZoneOutcome::Failed { reason } => Some(format!("zone {zone_id} failed: {reason}")),
            })
            .collect();

        if problems.is_empty() {
            self.last_success = Some(report.at);
            self.success_count += 1;
            self.last_error = None;
        } else {
            self.error_count += 1;
            self.last_error = Some(problems.join("; "));
        }
    }
}

/// Periodic owner of the live control loop
pub struct TaskScheduler {
    control: Arc<LiveControlLoop>,
    poll_interval: Duration,
    control_status: Arc<RwLock<TaskStatus>>,
    last_cycle: Arc<RwLock<Option<CycleReport>>>,
}

impl TaskScheduler {
    pub fn new(control: Arc<LiveControlLoop>, poll_interval: Duration) -> Self {
        Self {
            control,
            poll_interval,
            control_status: Arc::new(RwLock::new(TaskStatus::default())),
            last_cycle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn control(&self) -> &Arc<LiveControlLoop> {
        &self.control
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            zones = self.control.zones().len(),
            "starting control loop"
        );
        tokio::spawn(async move { self.run_control_task(shutdown).await })
    }

    async fn run_control_task(&self, shutdown: CancellationToken) {
        let mut interval = interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("control loop stopped");
                    return;
                }
                _ = interval.tick() => {}
            }
            self.run_once(Utc::now()).await;
        }
    }

    /// Run one cycle and fold it into the task status.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CycleReport {
        let report = self.control.run_cycle(now).await;
        let unsettled = report.unsettled();
        if unsettled > 0 {
            warn!(unsettled, zones = report.zones.len(), "control cycle incomplete");
        }

        self.control_status.write().await.record(&report);
        *self.last_cycle.write().await = Some(report.clone());
        report
    }

    pub async fn get_control_status(&self) -> TaskStatus {
        self.control_status.read().await.clone()
    }

    pub async fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.read().await.clone()
    }
}
