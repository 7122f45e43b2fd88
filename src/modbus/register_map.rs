use serde::{Deserialize, Serialize};

use super::{parser, ProtocolError};

/// Number of holding registers exposed per zone
pub const REGISTER_COUNT: u16 = 4;

/// Fixed-point scale of temperature registers (one decimal)
pub const TEMPERATURE_SCALE: f64 = 0.1;

/// Holding register layout of a zone slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum Register {
    CurrentTemp = 0,
    TargetTemp = 1,
    Occupancy = 2,
    HeaterStatus = 3,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT as usize] = [
        Register::CurrentTemp,
        Register::TargetTemp,
        Register::Occupancy,
        Register::HeaterStatus,
    ];

    pub fn address(self) -> u16 {
        self as u16
    }

    pub fn from_address(address: u16) -> Option<Self> {
        Self::ALL.get(address as usize).copied()
    }

    /// Only the target temperature may be written from the master side;
    /// the other registers are published by the simulator.
    pub fn is_master_writable(self) -> bool {
        matches!(self, Register::TargetTemp)
    }

    pub fn is_temperature(self) -> bool {
        matches!(self, Register::CurrentTemp | Register::TargetTemp)
    }
}

/// Decoded register content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Temperature(f64),
    Flag(bool),
}

impl RegisterValue {
    pub fn decode(register: Register, raw: u16) -> Self {
        if register.is_temperature() {
            RegisterValue::Temperature(parser::parse_scaled_value(&[raw], TEMPERATURE_SCALE))
        } else {
            RegisterValue::Flag(parser::parse_flag(raw))
        }
    }

    pub fn encode(self) -> Result<u16, ProtocolError> {
        match self {
            RegisterValue::Temperature(t) => parser::encode_scaled(t, TEMPERATURE_SCALE),
            RegisterValue::Flag(f) => Ok(parser::encode_flag(f)),
        }
    }

    pub fn as_temperature(self) -> Option<f64> {
        match self {
            RegisterValue::Temperature(t) => Some(t),
            RegisterValue::Flag(_) => None,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            RegisterValue::Flag(f) => Some(f),
            RegisterValue::Temperature(_) => None,
        }
    }
}
