use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SimulationError;
use crate::controller::decision::{decide, DecisionConfig, DecisionInput};
use crate::domain::{
    ConfigurationError, HistoricalDataPoint, RunId, RunSummary, WeatherSample, WeatherSnapshot, ZoneId,
    ZonePreferences,
};
use crate::pricing::EnergyPricer;
use crate::simulation::thermal::{ThermalModelConfig, ZoneThermalModel};

/// Deterministic occupancy used by historical runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyRule {
    /// First occupied hour (inclusive, zone-local)
    pub start_hour: u32,
    /// End of the occupied window (exclusive, zone-local). Below
    /// `start_hour` the window wraps past midnight.
    pub end_hour: u32,
    pub weekdays_only: bool,
}

impl OccupancyRule {
    pub fn is_occupied(&self, weekday: Weekday, hour: u32) -> bool {
        if self.weekdays_only && matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSettings {
    pub step_minutes: u32,
    pub heater_power_kw: f64,
    /// Starting temperature; the zone's default occupied temperature when unset
    #[serde(default)]
    pub initial_temp_c: Option<f64>,
    pub occupancy: OccupancyRule,
}

impl HistoricalSettings {
    pub fn step(&self) -> Duration {
        Duration::minutes(self.step_minutes as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.step_minutes == 0 {
            return Err(ConfigurationError::Invalid("historical.step_minutes must be positive".into()));
        }
        if !self.heater_power_kw.is_finite() || self.heater_power_kw < 0.0 {
            return Err(ConfigurationError::Invalid(
                "historical.heater_power_kw must be a non-negative number".into(),
            ));
        }
        if self.occupancy.start_hour > 24 || self.occupancy.end_hour > 24 {
            return Err(ConfigurationError::Invalid("occupancy hours must be within 0..=24".into()));
        }
        if self.occupancy.start_hour == self.occupancy.end_hour {
            return Err(ConfigurationError::Invalid(format!(
                "occupancy window {}..{} is empty",
                self.occupancy.start_hour, self.occupancy.end_hour
            )));
        }
        Ok(())
    }
}

/// Everything one run needs besides the weather series.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub run_id: RunId,
    pub zone_id: ZoneId,
    pub preferences: ZonePreferences,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Stateless stepping engine; every call owns its own thermal state.
pub struct HistoricalEngine {
    settings: HistoricalSettings,
    thermal: ThermalModelConfig,
    decision: DecisionConfig,
    timezone: Tz,
    pricer: Arc<dyn EnergyPricer>,
}

impl HistoricalEngine {
    pub fn new(
        settings: HistoricalSettings,
        thermal: ThermalModelConfig,
        decision: DecisionConfig,
        timezone: Tz,
        pricer: Arc<dyn EnergyPricer>,
    ) -> Self {
        Self {
            settings,
            thermal,
            decision,
            timezone,
            pricer,
        }
    }

    /// Step from `plan.start` to `plan.end` inclusive, handing each point to
    /// `emit` in timestamp order. Stops at the first error; points already
    /// emitted stay with the caller.
    pub fn simulate<F>(
        &self,
        plan: &RunPlan,
        samples: &[WeatherSample],
        mut emit: F,
    ) -> Result<RunSummary, SimulationError>
    where
        F: FnMut(HistoricalDataPoint) -> Result<(), SimulationError>,
    {
        plan.preferences.validate()?;
        self.settings.validate()?;
        if plan.start > plan.end {
            return Err(SimulationError::EmptyRange {
                start: plan.start,
                end: plan.end,
            });
        }

        let series: BTreeMap<DateTime<Utc>, f64> =
            samples.iter().map(|s| (s.timestamp, s.outdoor_temp_c)).collect();
        let step = self.settings.step();
        let initial_temp = self
            .settings
            .initial_temp_c
            .unwrap_or(plan.preferences.default_occupied_temp);

        let mut model = ZoneThermalModel::new(self.thermal, initial_temp, 0.0);
        let mut summary = RunSummary::default();
        let mut t = plan.start;

        while t <= plan.end {
            let outdoor_temp = *series.get(&t).ok_or(SimulationError::DataGap(t))?;
            let local = t.with_timezone(&self.timezone);
            let occupied = self.settings.occupancy.is_occupied(local.weekday(), local.hour());
            let price_level = self.pricer.price_level(t);

            let decision = decide(
                &plan.preferences,
                &self.decision,
                &DecisionInput {
                    time_of_day: local.time(),
                    occupied,
                    current_temp: model.current_temp_c(),
                    heater_on: model.state().heater_on,
                    weather: Some(WeatherSnapshot {
                        outdoor_temp_c: outdoor_temp,
                        is_day: None,
                        observed_at: t,
                    }),
                    price_level: Some(price_level),
                },
            )?;

            model.set_heater(decision.heater_on);
            model.set_outdoor_temp(outdoor_temp);

            // The closing boundary sample covers no time
            let duration = step.min(plan.end - t);
            let hours = duration.num_seconds() as f64 / 3600.0;
            let energy_kwh = if decision.heater_on {
                hours * self.settings.heater_power_kw
            } else {
                0.0
            };

            let point = HistoricalDataPoint {
                run_id: plan.run_id,
                timestamp: t,
                simulated_temp: model.current_temp_c(),
                target_temp: decision.target_temp,
                heater_on: decision.heater_on,
                occupancy: occupied,
                outdoor_temp,
                energy_price_level: price_level,
                energy_kwh,
                estimated_energy_increment: energy_kwh * price_level.price_per_kwh(),
            };
            summary.record(&point);
            emit(point)?;

            model.step(duration.num_seconds() as f64);
            t += step;
        }

        debug!(
            run_id = %plan.run_id,
            steps = summary.steps,
            energy_kwh = summary.total_energy_kwh,
            "historical simulation finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PriceLevel, ScheduleEntry};
    use crate::pricing::TimeOfUseTariff;
    use chrono::{NaiveTime, TimeZone};
    use uuid::Uuid;

    fn engine(timezone: Tz) -> HistoricalEngine {
        HistoricalEngine::new(
            HistoricalSettings {
                step_minutes: 60,
                heater_power_kw: 2.0,
                initial_temp_c: None,
                occupancy: OccupancyRule {
                    start_hour: 7,
                    end_hour: 22,
                    weekdays_only: true,
                },
            },
            ThermalModelConfig {
                heating_rate_c_per_hour: 1.0,
                ambient_rate_per_hour: 0.1,
            },
            DecisionConfig {
                hysteresis_band_c: 0.5,
                weather: None,
                price: None,
            },
            timezone,
            Arc::new(TimeOfUseTariff::default()),
        )
    }

    fn prefs() -> ZonePreferences {
        ZonePreferences {
            default_occupied_temp: 21.0,
            default_unoccupied_temp: 17.0,
            min_target_temp: 16.0,
            max_target_temp: 24.0,
            setback_setpoint: None,
            use_occupancy_for_heating: true,
            allow_weather_adjustment: false,
            schedule: vec![ScheduleEntry::new(NaiveTime::from_hms_opt(7, 0, 0).unwrap(), 21.0, 17.0)],
        }
    }

    // 2024-01-08 is a Monday
    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn hourly(from: DateTime<Utc>, hours: i64, temp: f64) -> Vec<WeatherSample> {
        (0..=hours)
            .map(|h| WeatherSample {
                timestamp: from + Duration::hours(h),
                outdoor_temp_c: temp,
            })
            .collect()
    }

    fn plan(start: DateTime<Utc>, end: DateTime<Utc>) -> RunPlan {
        RunPlan {
            run_id: Uuid::nil(),
            zone_id: 1,
            preferences: prefs(),
            start,
            end,
        }
    }

    fn collect(engine: &HistoricalEngine, plan: &RunPlan, samples: &[WeatherSample]) -> (Result<RunSummary, SimulationError>, Vec<HistoricalDataPoint>) {
        let mut points = Vec::new();
        let result = engine.simulate(plan, samples, |p| {
            points.push(p);
            Ok(())
        });
        (result, points)
    }

    #[test]
    fn test_one_point_per_step_inclusive() {
        let engine = engine(Tz::UTC);
        let plan = plan(utc(8, 0), utc(8, 12));
        let (result, points) = collect(&engine, &plan, &hourly(utc(8, 0), 12, 5.0));
        let summary = result.unwrap();
        assert_eq!(points.len(), 13);
        assert_eq!(summary.steps, 13);
        assert_eq!(points.first().unwrap().timestamp, utc(8, 0));
        assert_eq!(points.last().unwrap().timestamp, utc(8, 12));
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        // Closing boundary carries no energy
        assert_eq!(points.last().unwrap().energy_kwh, 0.0);
    }

    #[test]
    fn test_occupancy_rule_and_targets() {
        let engine = engine(Tz::UTC);
        let plan = plan(utc(8, 5), utc(8, 8));
        let (result, points) = collect(&engine, &plan, &hourly(utc(8, 5), 3, 5.0));
        result.unwrap();
        let occupancy: Vec<bool> = points.iter().map(|p| p.occupancy).collect();
        assert_eq!(occupancy, vec![false, false, true, true]);
        let targets: Vec<f64> = points.iter().map(|p| p.target_temp).collect();
        assert_eq!(targets, vec![17.0, 17.0, 21.0, 21.0]);
    }

    #[test]
    fn test_occupancy_window_wraps_past_midnight() {
        let night = OccupancyRule {
            start_hour: 22,
            end_hour: 6,
            weekdays_only: false,
        };
        let occupied: Vec<u32> = (0..24).filter(|&h| night.is_occupied(Weekday::Wed, h)).collect();
        assert_eq!(occupied, vec![0, 1, 2, 3, 4, 5, 22, 23]);
    }

    #[test]
    fn test_empty_occupancy_window_rejected() {
        let settings = HistoricalSettings {
            step_minutes: 60,
            heater_power_kw: 2.0,
            initial_temp_c: None,
            occupancy: OccupancyRule {
                start_hour: 9,
                end_hour: 9,
                weekdays_only: false,
            },
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_weekend_is_unoccupied() {
        let engine = engine(Tz::UTC);
        // Saturday
        let plan = plan(utc(13, 10), utc(13, 12));
        let (_, points) = collect(&engine, &plan, &hourly(utc(13, 10), 2, 5.0));
        assert!(points.iter().all(|p| !p.occupancy));
    }

    #[test]
    fn test_occupancy_uses_zone_timezone() {
        let engine = engine(chrono_tz::America::New_York);
        // 12:00 UTC is 07:00 in New York
        let plan = plan(utc(8, 11), utc(8, 12));
        let (_, points) = collect(&engine, &plan, &hourly(utc(8, 11), 1, 5.0));
        let occupancy: Vec<bool> = points.iter().map(|p| p.occupancy).collect();
        assert_eq!(occupancy, vec![false, true]);
    }

    #[test]
    fn test_energy_weighted_by_price_level() {
        let engine = engine(Tz::UTC);
        // Cold start far below target so the heater runs every step; 17:00-19:00 is peak
        let mut plan = plan(utc(8, 17), utc(8, 19));
        plan.preferences.default_occupied_temp = 10.0;
        plan.preferences.min_target_temp = 10.0;
        plan.preferences.schedule = vec![ScheduleEntry::new(NaiveTime::from_hms_opt(0, 0, 0).unwrap(), 24.0, 24.0)];
        let (result, points) = collect(&engine, &plan, &hourly(utc(8, 17), 2, 0.0));
        let summary = result.unwrap();

        assert!(points[..2].iter().all(|p| p.heater_on));
        assert!(points.iter().all(|p| p.energy_price_level == PriceLevel::Peak));
        assert_eq!(points[0].energy_kwh, 2.0);
        assert!((points[0].estimated_energy_increment - 0.5).abs() < 1e-12);
        assert_eq!(summary.total_energy_kwh, 4.0);
        assert!((summary.total_weighted_energy - 1.0).abs() < 1e-12);
        // Temperatures rise by the heating rate each hour
        assert_eq!(points[0].simulated_temp, 10.0);
        assert_eq!(points[1].simulated_temp, 11.0);
    }

    #[test]
    fn test_missing_sample_fails_with_partial_points() {
        let engine = engine(Tz::UTC);
        let plan = plan(utc(8, 0), utc(8, 6));
        let mut samples = hourly(utc(8, 0), 6, 3.0);
        samples.remove(4);
        let (result, points) = collect(&engine, &plan, &samples);
        assert_eq!(result, Err(SimulationError::DataGap(utc(8, 4))));
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn test_inverted_range() {
        let engine = engine(Tz::UTC);
        let plan = plan(utc(9, 0), utc(8, 0));
        let (result, points) = collect(&engine, &plan, &[]);
        assert!(matches!(result, Err(SimulationError::EmptyRange { .. })));
        assert!(points.is_empty());
    }

    #[test]
    fn test_invalid_preferences_fail_before_stepping() {
        let engine = engine(Tz::UTC);
        let mut plan = plan(utc(8, 0), utc(8, 2));
        plan.preferences.min_target_temp = 30.0;
        let (result, points) = collect(&engine, &plan, &hourly(utc(8, 0), 2, 3.0));
        assert!(matches!(result, Err(SimulationError::Configuration(_))));
        assert!(points.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let engine = engine(chrono_tz::Europe::Berlin);
        let plan = plan(utc(8, 0), utc(10, 0));
        let samples: Vec<WeatherSample> = hourly(utc(8, 0), 48, 0.0)
            .into_iter()
            .enumerate()
            .map(|(i, s)| WeatherSample {
                outdoor_temp_c: -5.0 + (i % 12) as f64,
                ..s
            })
            .collect();
        let (a, first) = collect(&engine, &plan, &samples);
        let (b, second) = collect(&engine, &plan, &samples);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
