use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use super::RegisterLink;
use crate::modbus::client::ModbusClient;
use crate::modbus::ProtocolError;

/// Link to a zone slave over Modbus TCP.
pub struct ModbusTcpLink {
    client: ModbusClient,
}

impl ModbusTcpLink {
    pub fn new(addr: SocketAddr, unit_id: u8, connect_timeout: Duration) -> Self {
        Self {
            client: ModbusClient::new(addr, unit_id, connect_timeout),
        }
    }
}

#[async_trait]
impl RegisterLink for ModbusTcpLink {
    async fn read_holding(&self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        self.client.read_holding_registers(start, count).await
    }

    async fn write_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        self.client.write_single_register(address, value).await
    }

    async fn reset(&self) {
        self.client.disconnect().await;
    }

    fn endpoint(&self) -> String {
        format!("modbus-tcp://{}/{}", self.client.addr(), self.client.unit_id())
    }
}
