//! Control decision engine.
//!
//! [`decide`] turns zone preferences plus the current observation into a
//! target temperature and a heater command. It performs no I/O and reads no
//! clock, so the live loop and historical runs produce identical decisions
//! for identical inputs.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::hysteresis::HysteresisBand;
use crate::domain::{ConfigurationError, PriceLevel, ScheduleEntry, WeatherSnapshot, ZonePreferences};

/// Fixed offset applied when the outdoor temperature leaves a comfort window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherAdjustment {
    /// Above this outdoor temperature the target is lowered by `step_c`
    pub high_threshold_c: f64,
    /// Below this outdoor temperature the target is raised by `step_c`
    pub low_threshold_c: f64,
    pub step_c: f64,
}

/// Target reduction for occupied zones during expensive tariff periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAdjustment {
    pub peak_reduction_c: f64,
    pub super_peak_reduction_c: f64,
}

impl PriceAdjustment {
    fn reduction(&self, level: PriceLevel) -> f64 {
        match level {
            PriceLevel::Peak => self.peak_reduction_c,
            PriceLevel::SuperPeak => self.super_peak_reduction_c,
            PriceLevel::OffPeak | PriceLevel::Standard => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub hysteresis_band_c: f64,
    #[serde(default)]
    pub weather: Option<WeatherAdjustment>,
    #[serde(default)]
    pub price: Option<PriceAdjustment>,
}

impl DecisionConfig {
    pub fn band(&self) -> HysteresisBand {
        HysteresisBand::new(self.hysteresis_band_c)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.hysteresis_band_c.is_finite() || self.hysteresis_band_c < 0.0 {
            return Err(ConfigurationError::Invalid(format!(
                "hysteresis_band_c must be a non-negative number, got {}",
                self.hysteresis_band_c
            )));
        }
        if let Some(w) = &self.weather {
            if !(w.low_threshold_c.is_finite() && w.high_threshold_c.is_finite() && w.step_c.is_finite()) {
                return Err(ConfigurationError::NonFinite {
                    field: "decision.weather",
                });
            }
            if w.low_threshold_c > w.high_threshold_c {
                return Err(ConfigurationError::Invalid(format!(
                    "weather low threshold {} is above high threshold {}",
                    w.low_threshold_c, w.high_threshold_c
                )));
            }
            if w.step_c < 0.0 {
                return Err(ConfigurationError::Invalid("weather step_c must not be negative".into()));
            }
        }
        if let Some(p) = &self.price {
            if !(p.peak_reduction_c.is_finite() && p.super_peak_reduction_c.is_finite()) {
                return Err(ConfigurationError::NonFinite {
                    field: "decision.price",
                });
            }
        }
        Ok(())
    }
}

/// Observation a decision is made from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInput {
    /// Zone-local time of day
    pub time_of_day: NaiveTime,
    pub occupied: bool,
    pub current_temp: f64,
    /// Heater status as last reported by the zone
    pub heater_on: bool,
    pub weather: Option<WeatherSnapshot>,
    pub price_level: Option<PriceLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlDecision {
    pub target_temp: f64,
    pub heater_on: bool,
}

/// Schedule entry active at `time`: the latest entry at or before it, or the
/// last entry of the day when `time` precedes every entry. The schedule must
/// be sorted ascending.
pub fn resolve_schedule(schedule: &[ScheduleEntry], time: NaiveTime) -> Option<&ScheduleEntry> {
    let idx = schedule.partition_point(|e| e.time <= time);
    if idx == 0 {
        schedule.last()
    } else {
        schedule.get(idx - 1)
    }
}

/// Occupancy-selected, setback-adjusted target before weather and clamping.
fn base_target(prefs: &ZonePreferences, time: NaiveTime, occupied: bool) -> f64 {
    let (occupied_temp, unoccupied_temp) = match resolve_schedule(&prefs.schedule, time) {
        Some(entry) => (entry.occupied_temp, entry.unoccupied_temp),
        None => (prefs.default_occupied_temp, prefs.default_unoccupied_temp),
    };

    let selected = if prefs.use_occupancy_for_heating && !occupied {
        unoccupied_temp
    } else {
        occupied_temp
    };

    match prefs.setback_setpoint {
        Some(setback) if !occupied && setback < selected => setback,
        _ => selected,
    }
}

fn weather_offset(adjustment: &WeatherAdjustment, weather: &WeatherSnapshot) -> f64 {
    if weather.outdoor_temp_c > adjustment.high_threshold_c {
        -adjustment.step_c
    } else if weather.outdoor_temp_c < adjustment.low_threshold_c {
        adjustment.step_c
    } else {
        0.0
    }
}

pub fn decide(
    prefs: &ZonePreferences,
    config: &DecisionConfig,
    input: &DecisionInput,
) -> Result<ControlDecision, ConfigurationError> {
    prefs.validate()?;

    let mut target = base_target(prefs, input.time_of_day, input.occupied);

    if let (Some(price), Some(level), true) = (&config.price, input.price_level, input.occupied) {
        target -= price.reduction(level);
    }

    if prefs.allow_weather_adjustment {
        if let (Some(adjustment), Some(weather)) = (&config.weather, &input.weather) {
            target += weather_offset(adjustment, weather);
        }
    }

    let target_temp = prefs.clamp_target(target);
    let heater_on = config
        .band()
        .decide(input.current_temp, target_temp, input.heater_on);

    Ok(ControlDecision {
        target_temp,
        heater_on,
    })
}
