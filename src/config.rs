use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use itertools::Itertools;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::controller::decision::DecisionConfig;
use crate::domain::{ConfigurationError, GeoLocation, ZoneId, ZonePreferences};
use crate::hardware::Transport;
use crate::historical::HistoricalSettings;
use crate::repo::RetentionPolicy;
use crate::simulation::{SimulatorConfig, ZoneSeed};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub controller: ControllerConfig,
    pub decision: DecisionConfig,
    pub simulator: SimulatorConfig,
    pub historical: HistoricalSettings,
    pub weather: WeatherConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub poll_seconds: u64,
    pub protocol_timeout_ms: u64,
    /// Device target is rewritten only when it differs from the decision by more than this
    pub target_write_tolerance_c: f64,
    pub transport: Transport,
    /// IANA zone used for schedules and occupancy rules
    pub timezone: String,
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }

    pub fn protocol_timeout(&self) -> Duration {
        Duration::from_millis(self.protocol_timeout_ms)
    }

    pub fn timezone(&self) -> Result<Tz, ConfigurationError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigurationError::Invalid(format!("unknown timezone {:?}: {}", self.timezone, e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveWeatherConfig {
    pub base_url: String,
    pub api_key: String,
    pub location: GeoLocation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    /// Live conditions; decisions run without weather when unset
    #[serde(default)]
    pub live: Option<LiveWeatherConfig>,
    pub archive_base_url: String,
    pub http_timeout_secs: u64,
}

impl WeatherConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn default_modbus_host() -> String {
    "127.0.0.1".to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub id: ZoneId,
    pub name: String,
    #[serde(default = "default_modbus_host")]
    pub modbus_host: String,
    pub modbus_port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    pub initial_temp_c: f64,
    #[serde(default = "default_true")]
    pub initially_occupied: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub preferences: ZonePreferences,
}

impl ZoneConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.modbus_host, self.modbus_port).parse()?)
    }

    pub fn location(&self) -> GeoLocation {
        GeoLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            name: None,
        }
    }

    /// Simulator start state; the target starts at the occupied default.
    pub fn seed(&self) -> ZoneSeed {
        ZoneSeed {
            zone_id: self.id,
            initial_temp_c: self.initial_temp_c,
            initial_target_c: self.preferences.default_occupied_temp,
            initially_occupied: self.initially_occupied,
        }
    }
}

impl Config {
    /// Load `config/default.toml` (or `$ZHC_CONFIG`) overlaid with `ZHC__*` env vars.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var("ZHC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let figment = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ZHC__").split("__"));
        Self::from_figment(figment).with_context(|| format!("loading configuration from {path}"))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::from_figment(Figment::from(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let mut cfg: Config = figment.extract().context("invalid configuration")?;
        for zone in &mut cfg.zones {
            zone.preferences.normalize();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.controller.poll_seconds == 0 {
            return Err(ConfigurationError::Invalid("controller.poll_seconds must be positive".into()));
        }
        if self.controller.protocol_timeout_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "controller.protocol_timeout_ms must be positive".into(),
            ));
        }
        let tolerance = self.controller.target_write_tolerance_c;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigurationError::Invalid(
                "controller.target_write_tolerance_c must be a non-negative number".into(),
            ));
        }
        self.controller.timezone()?;
        let retention = &self.retention;
        if retention.max_readings_per_zone == 0
            || retention.max_commands_per_zone == 0
            || retention.max_historical_runs == 0
        {
            return Err(ConfigurationError::Invalid("retention limits must be positive".into()));
        }
        self.decision.validate()?;
        self.simulator.validate()?;
        self.historical.validate()?;
        // Logged heater intents must follow the simulator's own switching rule
        if self.decision.hysteresis_band_c != self.simulator.hysteresis_band_c {
            return Err(ConfigurationError::Invalid(format!(
                "decision.hysteresis_band_c ({}) must equal simulator.hysteresis_band_c ({})",
                self.decision.hysteresis_band_c, self.simulator.hysteresis_band_c
            )));
        }

        if let Some(id) = self.zones.iter().map(|z| z.id).duplicates().next() {
            return Err(ConfigurationError::Invalid(format!("duplicate zone id {id}")));
        }
        for zone in &self.zones {
            zone.preferences
                .validate()
                .map_err(|e| ConfigurationError::Invalid(format!("zone {}: {}", zone.id, e)))?;
        }
        Ok(())
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| z.id == zone_id)
    }
}
