use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ZoneId = u32;

/// Externally visible zone state as exposed by the register bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub current_temp: f64,
    pub target_temp: f64,
    pub occupancy: bool,
    pub heater_on: bool,
}

/// One successful poll of a zone, as persisted by the live loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub zone_id: ZoneId,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub target_temp: f64,
    pub occupancy: bool,
    pub heater_on: bool,
}

impl SensorReading {
    pub fn from_snapshot(zone_id: ZoneId, timestamp: DateTime<Utc>, s: &RegisterSnapshot) -> Self {
        Self {
            zone_id,
            timestamp,
            temperature: s.current_temp,
            target_temp: s.target_temp,
            occupancy: s.occupancy,
            heater_on: s.heater_on,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Target temperature written to the zone's register
    SetTargetTemp,
    /// Heater state the controller expects the zone to converge to
    HeaterIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub zone_id: ZoneId,
    pub timestamp: DateTime<Utc>,
    pub kind: CommandKind,
    pub target_temp: f64,
    pub heater_on: bool,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
