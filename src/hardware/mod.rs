//! Controller-side access to zone registers.
//!
//! A [`RegisterLink`] moves raw register words to and from one zone slave.
//! [`ZoneMaster`] sits on top of a link and is what the control loop talks to:
//! it applies the per-call timeout, converts scaled values and refuses writes
//! to simulator-owned registers before they reach the wire.

use async_trait::async_trait;

use crate::modbus::ProtocolError;

pub mod factory;
pub mod local;
pub mod master;
#[cfg(feature = "modbus")]
pub mod modbus;

pub use factory::{LinkFactory, Transport};
pub use local::LocalLink;
pub use master::ZoneMaster;

#[async_trait]
pub trait RegisterLink: Send + Sync {
    async fn read_holding(&self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError>;

    async fn write_register(&self, address: u16, value: u16) -> Result<(), ProtocolError>;

    /// Discard transport state after an abandoned request.
    async fn reset(&self) {}

    /// Human-readable peer description for logs
    fn endpoint(&self) -> String;
}
