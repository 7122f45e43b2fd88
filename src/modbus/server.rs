//! Modbus TCP slave exposing a zone's [`RegisterStore`].
//!
//! Frames are MBAP (7-byte header) followed by a PDU. Supported function
//! codes: read holding registers (0x03), write single register (0x06) and
//! write multiple registers (0x10). Errors answer with `function | 0x80`
//! and an exception code.

use std::io;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ProtocolError, RegisterStore};
use crate::domain::ZoneId;

pub const MBAP_HEADER_LEN: usize = 7;

/// Maximum quantity of a single read request
const MAX_READ_QUANTITY: u16 = 125;

/// Broadcast-style unit id accepted by every zone slave
const ANY_UNIT: u8 = 0xFF;

/// Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    WriteSingleRegister = 0x06,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    GatewayTargetFailed = 0x0B,
}

impl From<ProtocolError> for ExceptionCode {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ReadOnlyRegister(_) | ProtocolError::IllegalAddress { .. } => {
                ExceptionCode::IllegalDataAddress
            }
            ProtocolError::ValueOutOfRange(_) => ExceptionCode::IllegalDataValue,
            _ => ExceptionCode::ServerDeviceFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(bytes: &[u8; MBAP_HEADER_LEN]) -> Self {
        Self {
            transaction_id: BigEndian::read_u16(&bytes[0..2]),
            protocol_id: BigEndian::read_u16(&bytes[2..4]),
            length: BigEndian::read_u16(&bytes[4..6]),
            unit_id: bytes[6],
        }
    }

    /// Length of the PDU that follows the header
    pub fn pdu_len(&self) -> Option<usize> {
        match self.length {
            2..=254 => Some(self.length as usize - 1),
            _ => None,
        }
    }
}

/// Wrap a response PDU in an MBAP frame echoing the request's transaction id.
pub fn encode_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

pub fn exception_pdu(function_code: u8, exception: ExceptionCode) -> Vec<u8> {
    vec![function_code | 0x80, exception as u8]
}

/// Execute one request PDU against the store and build the response PDU.
pub fn process_pdu(store: &RegisterStore, pdu: &[u8]) -> Vec<u8> {
    let Some((&code, data)) = pdu.split_first() else {
        return exception_pdu(0, ExceptionCode::IllegalFunction);
    };

    let body = match FunctionCode::from_u8(code) {
        Some(FunctionCode::ReadHoldingRegisters) => read_holding_registers(store, data),
        Some(FunctionCode::WriteSingleRegister) => write_single_register(store, data),
        Some(FunctionCode::WriteMultipleRegisters) => write_multiple_registers(store, data),
        None => Err(ExceptionCode::IllegalFunction),
    };

    match body {
        Ok(body) => {
            let mut response = Vec::with_capacity(body.len() + 1);
            response.push(code);
            response.extend_from_slice(&body);
            response
        }
        Err(exception) => exception_pdu(code, exception),
    }
}

fn read_holding_registers(store: &RegisterStore, data: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
    if data.len() < 4 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = BigEndian::read_u16(&data[0..2]);
    let quantity = BigEndian::read_u16(&data[2..4]);
    if quantity == 0 || quantity > MAX_READ_QUANTITY {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values = store.read(start, quantity)?;
    let mut body = Vec::with_capacity(1 + values.len() * 2);
    body.push((values.len() * 2) as u8);
    for value in values {
        body.extend_from_slice(&value.to_be_bytes());
    }
    Ok(body)
}

fn write_single_register(store: &RegisterStore, data: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
    if data.len() < 4 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let address = BigEndian::read_u16(&data[0..2]);
    let value = BigEndian::read_u16(&data[2..4]);
    store.write(address, value)?;
    Ok(data[0..4].to_vec())
}

fn write_multiple_registers(store: &RegisterStore, data: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
    if data.len() < 5 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = BigEndian::read_u16(&data[0..2]);
    let quantity = BigEndian::read_u16(&data[2..4]);
    let byte_count = data[4] as usize;
    if quantity == 0 || byte_count != quantity as usize * 2 || data.len() < 5 + byte_count {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values: Vec<u16> = data[5..5 + byte_count]
        .chunks_exact(2)
        .map(BigEndian::read_u16)
        .collect();
    store.write_many(start, &values)?;
    Ok(data[0..4].to_vec())
}

/// Modbus TCP slave of one zone.
pub struct ZoneModbusServer {
    zone_id: ZoneId,
    unit_id: u8,
    store: Arc<RegisterStore>,
}

impl ZoneModbusServer {
    pub fn new(zone_id: ZoneId, unit_id: u8, store: Arc<RegisterStore>) -> Self {
        Self {
            zone_id,
            unit_id,
            store,
        }
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        info!(
            zone_id = self.zone_id,
            unit_id = self.unit_id,
            addr = %listener.local_addr()?,
            "zone modbus slave listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(zone_id = self.zone_id, "zone modbus slave stopped");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(zone_id = self.zone_id, error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(zone_id = self.zone_id, %peer, "master connected");
                    let server = self.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, shutdown).await {
                            debug!(zone_id = server.zone_id, %peer, error = %e, "connection closed with error");
                        }
                    });
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, shutdown: CancellationToken) -> io::Result<()> {
        loop {
            let mut header = [0u8; MBAP_HEADER_LEN];
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                read = stream.read_exact(&mut header) => match read {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(e),
                },
            }

            let header = MbapHeader::parse(&header);
            let pdu_len = match header.pdu_len() {
                Some(len) if header.protocol_id == 0 => len,
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("malformed MBAP header: {:?}", header),
                    ))
                }
            };

            let mut pdu = vec![0u8; pdu_len];
            stream.read_exact(&mut pdu).await?;

            let response = if header.unit_id == self.unit_id || header.unit_id == ANY_UNIT {
                process_pdu(&self.store, &pdu)
            } else {
                exception_pdu(pdu[0], ExceptionCode::GatewayTargetFailed)
            };

            stream
                .write_all(&encode_frame(header.transaction_id, header.unit_id, &response))
                .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegisterSnapshot;

    fn store() -> RegisterStore {
        RegisterStore::new(&RegisterSnapshot {
            current_temp: 19.5,
            target_temp: 21.0,
            occupancy: true,
            heater_on: true,
        })
        .unwrap()
    }

    #[test]
    fn test_read_holding_registers() {
        let response = process_pdu(&store(), &[0x03, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(
            response,
            vec![0x03, 8, 0x00, 195, 0x00, 210, 0x00, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn test_read_out_of_range_is_illegal_address() {
        let response = process_pdu(&store(), &[0x03, 0x00, 0x02, 0x00, 0x05]);
        assert_eq!(response, vec![0x83, 0x02]);
    }

    #[test]
    fn test_read_zero_quantity_is_illegal_value() {
        let response = process_pdu(&store(), &[0x03, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(response, vec![0x83, 0x03]);
    }

    #[test]
    fn test_write_target_echoes_request() {
        let store = store();
        let response = process_pdu(&store, &[0x06, 0x00, 0x01, 0x00, 225]);
        assert_eq!(response, vec![0x06, 0x00, 0x01, 0x00, 225]);
        assert_eq!(store.target_temp(), 22.5);
    }

    #[test]
    fn test_write_simulator_register_is_rejected() {
        let store = store();
        let response = process_pdu(&store, &[0x06, 0x00, 0x03, 0x00, 0x00]);
        assert_eq!(response, vec![0x86, 0x02]);
        assert!(store.snapshot().heater_on);
    }

    #[test]
    fn test_write_multiple_target_only() {
        let store = store();
        let response = process_pdu(&store, &[0x10, 0x00, 0x01, 0x00, 0x01, 0x02, 0x00, 200]);
        assert_eq!(response, vec![0x10, 0x00, 0x01, 0x00, 0x01]);
        assert_eq!(store.target_temp(), 20.0);

        let response = process_pdu(&store, &[0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0, 1, 0, 2]);
        assert_eq!(response, vec![0x90, 0x02]);
    }

    #[test]
    fn test_write_multiple_byte_count_mismatch() {
        let response = process_pdu(&store(), &[0x10, 0x00, 0x01, 0x00, 0x01, 0x04, 0x00, 200]);
        assert_eq!(response, vec![0x90, 0x03]);
    }

    #[test]
    fn test_unknown_function() {
        let response = process_pdu(&store(), &[0x04, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(response, vec![0x84, 0x01]);
    }

    #[test]
    fn test_frame_round_trip() {
        let frame = encode_frame(0x1234, 7, &[0x03, 2, 0, 210]);
        let mut header = [0u8; MBAP_HEADER_LEN];
        header.copy_from_slice(&frame[..MBAP_HEADER_LEN]);
        let header = MbapHeader::parse(&header);
        assert_eq!(header.transaction_id, 0x1234);
        assert_eq!(header.protocol_id, 0);
        assert_eq!(header.unit_id, 7);
        assert_eq!(header.pdu_len(), Some(4));
        assert_eq!(&frame[MBAP_HEADER_LEN..], &[0x03, 2, 0, 210]);
    }
}
