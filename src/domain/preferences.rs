use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid zone or controller configuration. Fatal for the decision it guards,
/// never silently repaired.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("min_target_temp {min} is greater than max_target_temp {max}")]
    InvertedBounds { min: f64, max: f64 },
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("schedule entries must be strictly ascending by time of day (entry {index} at {time})")]
    UnsortedSchedule { index: usize, time: NaiveTime },
    #[error("{0}")]
    Invalid(String),
}

/// One schedule switch point. Active from `time` until the next entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub time: NaiveTime,
    pub occupied_temp: f64,
    pub unoccupied_temp: f64,
}

impl ScheduleEntry {
    pub fn new(time: NaiveTime, occupied_temp: f64, unoccupied_temp: f64) -> Self {
        Self {
            time,
            occupied_temp,
            unoccupied_temp,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-zone comfort preferences consumed by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePreferences {
    pub default_occupied_temp: f64,
    pub default_unoccupied_temp: f64,
    pub min_target_temp: f64,
    pub max_target_temp: f64,
    #[serde(default)]
    pub setback_setpoint: Option<f64>,
    #[serde(default = "default_true")]
    pub use_occupancy_for_heating: bool,
    #[serde(default)]
    pub allow_weather_adjustment: bool,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

impl ZonePreferences {
    /// Sort the schedule by time of day. Used when preferences arrive from
    /// config files or the API, where entry order is not guaranteed.
    pub fn normalize(&mut self) {
        self.schedule.sort_by_key(|e| e.time);
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let scalars = [
            ("default_occupied_temp", self.default_occupied_temp),
            ("default_unoccupied_temp", self.default_unoccupied_temp),
            ("min_target_temp", self.min_target_temp),
            ("max_target_temp", self.max_target_temp),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFinite { field });
            }
        }
        if let Some(setback) = self.setback_setpoint {
            if !setback.is_finite() {
                return Err(ConfigurationError::NonFinite {
                    field: "setback_setpoint",
                });
            }
        }
        if self.min_target_temp > self.max_target_temp {
            return Err(ConfigurationError::InvertedBounds {
                min: self.min_target_temp,
                max: self.max_target_temp,
            });
        }

        for (index, entry) in self.schedule.iter().enumerate() {
            if !entry.occupied_temp.is_finite() || !entry.unoccupied_temp.is_finite() {
                return Err(ConfigurationError::NonFinite {
                    field: "schedule temperature",
                });
            }
            if index > 0 && self.schedule[index - 1].time >= entry.time {
                return Err(ConfigurationError::UnsortedSchedule {
                    index,
                    time: entry.time,
                });
            }
        }
        Ok(())
    }

    pub fn clamp_target(&self, value: f64) -> f64 {
        value.clamp(self.min_target_temp, self.max_target_temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn prefs() -> ZonePreferences {
        ZonePreferences {
            default_occupied_temp: 21.5,
            default_unoccupied_temp: 17.0,
            min_target_temp: 16.0,
            max_target_temp: 24.0,
            setback_setpoint: None,
            use_occupancy_for_heating: true,
            allow_weather_adjustment: false,
            schedule: vec![
                ScheduleEntry::new(at(7, 0), 21.0, 17.0),
                ScheduleEntry::new(at(22, 0), 19.0, 16.0),
            ],
        }
    }

    #[test]
    fn test_valid_preferences() {
        assert!(prefs().validate().is_ok());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut p = prefs();
        p.min_target_temp = 25.0;
        assert_eq!(
            p.validate(),
            Err(ConfigurationError::InvertedBounds { min: 25.0, max: 24.0 })
        );
    }

    #[test]
    fn test_unsorted_schedule_rejected_until_normalized() {
        let mut p = prefs();
        p.schedule.reverse();
        assert!(matches!(
            p.validate(),
            Err(ConfigurationError::UnsortedSchedule { index: 1, .. })
        ));

        p.normalize();
        assert!(p.validate().is_ok());
        assert_eq!(p.schedule[0].time, at(7, 0));
    }

    #[test]
    fn test_duplicate_schedule_time_rejected() {
        let mut p = prefs();
        p.schedule.push(ScheduleEntry::new(at(22, 0), 18.0, 15.0));
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let mut p = prefs();
        p.setback_setpoint = Some(f64::NAN);
        assert_eq!(
            p.validate(),
            Err(ConfigurationError::NonFinite {
                field: "setback_setpoint"
            })
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let p: ZonePreferences = serde_json::from_str(
            r#"{
                "default_occupied_temp": 21.0,
                "default_unoccupied_temp": 17.0,
                "min_target_temp": 15.0,
                "max_target_temp": 25.0,
                "schedule": [{"time": "07:00:00", "occupied_temp": 21.0, "unoccupied_temp": 17.0}]
            }"#,
        )
        .unwrap();
        assert!(p.use_occupancy_for_heating);
        assert!(!p.allow_weather_adjustment);
        assert_eq!(p.setback_setpoint, None);
        assert_eq!(p.schedule[0].time, at(7, 0));
    }
}
