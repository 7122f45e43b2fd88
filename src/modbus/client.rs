use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

use super::ProtocolError;

/// Modbus TCP master for one zone slave.
///
/// Connects lazily on the first request. A transport failure drops the
/// connection; the next request reconnects. Requests are never retried here,
/// the caller skips the cycle instead.
pub struct ModbusClient {
    addr: SocketAddr,
    unit_id: u8,
    connect_timeout: Duration,
    context: Mutex<Option<Context>>,
}

impl ModbusClient {
    pub fn new(addr: SocketAddr, unit_id: u8, connect_timeout: Duration) -> Self {
        Self {
            addr,
            unit_id,
            connect_timeout,
            context: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        let mut slot = self.context.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;
        let result = ctx.read_holding_registers(start, count).await;
        result.map_err(|e| self.request_error(&mut slot, "read", start, e))
    }

    pub async fn write_single_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        let mut slot = self.context.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;
        let result = ctx.write_single_register(address, value).await;
        result.map_err(|e| self.request_error(&mut slot, "write", address, e))
    }

    /// Drop the current connection, e.g. after a request was abandoned mid-flight.
    pub async fn disconnect(&self) {
        if self.context.lock().await.take().is_some() {
            debug!(addr = %self.addr, "dropped modbus connection");
        }
    }

    async fn ensure_connected<'a>(&self, slot: &'a mut Option<Context>) -> Result<&'a mut Context, ProtocolError> {
        if slot.is_none() {
            debug!(addr = %self.addr, unit_id = self.unit_id, "connecting to zone slave");
            let ctx = timeout(self.connect_timeout, tcp::connect_slave(self.addr, Slave(self.unit_id)))
                .await
                .map_err(|_| ProtocolError::Timeout(self.connect_timeout))?
                .map_err(|e| ProtocolError::Communication(format!("connect to {}: {}", self.addr, e)))?;
            *slot = Some(ctx);
        }
        slot.as_mut()
            .ok_or_else(|| ProtocolError::Communication(format!("no connection to {}", self.addr)))
    }

    /// Exception responses keep the connection; anything else drops it.
    fn request_error(&self, slot: &mut Option<Context>, op: &str, address: u16, err: io::Error) -> ProtocolError {
        if let Some(code) = exception_code(&err) {
            debug!(addr = %self.addr, address, code, "modbus {} rejected by slave", op);
            return ProtocolError::Exception(code);
        }
        *slot = None;
        warn!(addr = %self.addr, address, error = %err, "modbus {} failed", op);
        ProtocolError::Communication(format!("{} at register {} on {}: {}", op, address, self.addr, err))
    }
}

// tokio-modbus keeps its exception response type private. It surfaces as an
// `ErrorKind::Other` error whose message ends with the exception description.
const EXCEPTION_DESCRIPTIONS: [(u8, &str); 9] = [
    (0x01, "Illegal function"),
    (0x02, "Illegal data address"),
    (0x03, "Illegal data value"),
    (0x04, "Server device failure"),
    (0x05, "Acknowledge"),
    (0x06, "Server device busy"),
    (0x08, "Memory parity error"),
    (0x0A, "Gateway path unavailable"),
    (0x0B, "Gateway target device failed to respond"),
];

fn exception_code(err: &io::Error) -> Option<u8> {
    if err.kind() != io::ErrorKind::Other {
        return None;
    }
    let message = err.get_ref()?.to_string();
    EXCEPTION_DESCRIPTIONS
        .iter()
        .find(|(_, description)| message.ends_with(description))
        .map(|(code, _)| *code)
}
