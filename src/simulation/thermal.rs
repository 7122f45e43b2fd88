use serde::{Deserialize, Serialize};

use crate::domain::ConfigurationError;

/// First-order zone model: a heater adds a fixed rate, otherwise the zone
/// drifts toward the outdoor temperature proportionally to the difference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalModelConfig {
    /// Temperature rise while the heater is on (°C per hour)
    pub heating_rate_c_per_hour: f64,
    /// Fraction of the indoor/outdoor difference recovered per hour when off
    pub ambient_rate_per_hour: f64,
}

impl ThermalModelConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (field, value) in [
            ("heating_rate_c_per_hour", self.heating_rate_c_per_hour),
            ("ambient_rate_per_hour", self.ambient_rate_per_hour),
        ] {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFinite { field });
            }
            if value < 0.0 {
                return Err(ConfigurationError::Invalid(format!("{field} must not be negative")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneThermalState {
    pub current_temp_c: f64,
    pub heater_on: bool,
    pub outdoor_temp_c: f64,
}

#[derive(Debug, Clone)]
pub struct ZoneThermalModel {
    config: ThermalModelConfig,
    state: ZoneThermalState,
}

impl ZoneThermalModel {
    pub fn new(config: ThermalModelConfig, initial_temp_c: f64, outdoor_temp_c: f64) -> Self {
        Self {
            config,
            state: ZoneThermalState {
                current_temp_c: initial_temp_c,
                heater_on: false,
                outdoor_temp_c,
            },
        }
    }

    pub fn state(&self) -> &ZoneThermalState {
        &self.state
    }

    pub fn current_temp_c(&self) -> f64 {
        self.state.current_temp_c
    }

    pub fn set_heater(&mut self, on: bool) {
        self.state.heater_on = on;
    }

    pub fn set_outdoor_temp(&mut self, outdoor_temp_c: f64) {
        self.state.outdoor_temp_c = outdoor_temp_c;
    }

    /// Advance the model by `dt_seconds` with the current heater state.
    /// No clamping toward the target: heater switching is the caller's job.
    pub fn step(&mut self, dt_seconds: f64) {
        let dt_hours = dt_seconds / 3600.0;
        let delta = if self.state.heater_on {
            self.config.heating_rate_c_per_hour * dt_hours
        } else {
            let ambient_delta = self.state.outdoor_temp_c - self.state.current_temp_c;
            self.config.ambient_rate_per_hour * ambient_delta * dt_hours
        };
        self.state.current_temp_c += delta;
    }
}
