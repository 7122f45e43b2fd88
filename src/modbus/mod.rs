//! Register protocol surface of a zone.
//!
//! Each zone exposes four holding registers (see [`register_map::Register`]).
//! Temperatures travel as signed 16-bit integers scaled by
//! [`register_map::TEMPERATURE_SCALE`]; flags are `0`/`1`.
//!
//! - [`store`]: the in-memory register bank owned by a zone simulator
//! - [`server`]: Modbus TCP slave serving a store
//! - [`client`]: Modbus TCP master (feature `modbus`)
//! - [`parser`]: scale conversion helpers

use std::time::Duration;
use thiserror::Error;

pub mod parser;
pub mod register_map;
pub mod server;
pub mod store;

#[cfg(feature = "modbus")]
pub mod client;

pub use register_map::{Register, RegisterValue, REGISTER_COUNT, TEMPERATURE_SCALE};
pub use store::RegisterStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("communication error: {0}")]
    Communication(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("register {0} is owned by the simulator and cannot be written by the master")]
    ReadOnlyRegister(Register),
    #[error("illegal register range: start {start}, count {count}")]
    IllegalAddress { start: u16, count: u16 },
    #[error("value {0} does not fit the register encoding")]
    ValueOutOfRange(f64),
    #[error("value kind does not match register {0}")]
    KindMismatch(Register),
    #[error("slave answered with exception code {0:#04x}")]
    Exception(u8),
}

impl ProtocolError {
    /// Transport-level failure: the zone's data for this cycle is unavailable.
    pub fn is_communication(&self) -> bool {
        matches!(self, ProtocolError::Communication(_) | ProtocolError::Timeout(_))
    }
}
