use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use super::RegisterLink;
use crate::domain::{RegisterSnapshot, ZoneId};
use crate::modbus::store::decode_bank;
use crate::modbus::{ProtocolError, Register, RegisterValue, REGISTER_COUNT};

/// Protocol master for one zone.
#[derive(Clone)]
pub struct ZoneMaster {
    zone_id: ZoneId,
    link: Arc<dyn RegisterLink>,
    call_timeout: Duration,
}

impl ZoneMaster {
    pub fn new(zone_id: ZoneId, link: Arc<dyn RegisterLink>, call_timeout: Duration) -> Self {
        Self {
            zone_id,
            link,
            call_timeout,
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn endpoint(&self) -> String {
        self.link.endpoint()
    }

    /// Read the given registers in one request covering their address span.
    pub async fn read(&self, registers: &[Register]) -> Result<Vec<RegisterValue>, ProtocolError> {
        let (Some(first), Some(last)) = (
            registers.iter().map(|r| r.address()).min(),
            registers.iter().map(|r| r.address()).max(),
        ) else {
            return Ok(Vec::new());
        };

        let raw = self
            .call(self.link.read_holding(first, last - first + 1))
            .await?;

        registers
            .iter()
            .map(|r| {
                raw.get((r.address() - first) as usize)
                    .map(|&word| RegisterValue::decode(*r, word))
                    .ok_or(ProtocolError::IllegalAddress {
                        start: first,
                        count: raw.len() as u16,
                    })
            })
            .collect()
    }

    /// Read all four registers as one consistent snapshot.
    pub async fn read_snapshot(&self) -> Result<RegisterSnapshot, ProtocolError> {
        let raw = self.call(self.link.read_holding(0, REGISTER_COUNT)).await?;
        if raw.len() != REGISTER_COUNT as usize {
            return Err(ProtocolError::Communication(format!(
                "zone {} answered {} registers, expected {}",
                self.zone_id,
                raw.len(),
                REGISTER_COUNT
            )));
        }
        Ok(decode_bank(&raw))
    }

    pub async fn write(&self, register: Register, value: RegisterValue) -> Result<(), ProtocolError> {
        if !register.is_master_writable() {
            return Err(ProtocolError::ReadOnlyRegister(register));
        }
        if register.is_temperature() != value.as_temperature().is_some() {
            return Err(ProtocolError::KindMismatch(register));
        }
        let word = value.encode()?;
        debug!(zone_id = self.zone_id, %register, raw = word, "writing register");
        self.call(self.link.write_register(register.address(), word))
            .await
    }

    pub async fn write_target_temp(&self, target_temp: f64) -> Result<(), ProtocolError> {
        self.write(Register::TargetTemp, RegisterValue::Temperature(target_temp))
            .await
    }

    async fn call<T, F>(&self, request: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = Result<T, ProtocolError>>,
    {
        match timeout(self.call_timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                self.link.reset().await;
                Err(ProtocolError::Timeout(self.call_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::LocalLink;
    use crate::modbus::RegisterStore;
    use async_trait::async_trait;

    fn local() -> (Arc<RegisterStore>, Arc<LocalLink>, ZoneMaster) {
        let store = Arc::new(
            RegisterStore::new(&RegisterSnapshot {
                current_temp: 18.4,
                target_temp: 20.0,
                occupancy: false,
                heater_on: true,
            })
            .unwrap(),
        );
        let link = Arc::new(LocalLink::new(1, store.clone()));
        let master = ZoneMaster::new(1, link.clone(), Duration::from_secs(1));
        (store, link, master)
    }

    #[tokio::test]
    async fn test_read_snapshot() {
        let (_, _, master) = local();
        let snapshot = master.read_snapshot().await.unwrap();
        assert_eq!(snapshot.current_temp, 18.4);
        assert_eq!(snapshot.target_temp, 20.0);
        assert!(!snapshot.occupancy);
        assert!(snapshot.heater_on);
    }

    #[tokio::test]
    async fn test_read_selected_registers() {
        let (_, _, master) = local();
        let values = master
            .read(&[Register::HeaterStatus, Register::TargetTemp])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![RegisterValue::Flag(true), RegisterValue::Temperature(20.0)]
        );
        assert!(master.read(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_target() {
        let (store, _, master) = local();
        master.write_target_temp(21.5).await.unwrap();
        assert_eq!(store.target_temp(), 21.5);
    }

    #[tokio::test]
    async fn test_simulator_registers_rejected_locally() {
        let (store, _, master) = local();
        let err = master
            .write(Register::HeaterStatus, RegisterValue::Flag(false))
            .await
            .unwrap_err();
        assert_eq!(err, ProtocolError::ReadOnlyRegister(Register::HeaterStatus));
        assert!(store.snapshot().heater_on);

        let err = master
            .write(Register::TargetTemp, RegisterValue::Flag(true))
            .await
            .unwrap_err();
        assert_eq!(err, ProtocolError::KindMismatch(Register::TargetTemp));
    }

    #[tokio::test]
    async fn test_offline_link_is_communication_error() {
        let (store, link, master) = local();
        link.set_online(false);
        assert!(master.read_snapshot().await.unwrap_err().is_communication());
        assert!(master.write_target_temp(23.0).await.unwrap_err().is_communication());
        assert_eq!(store.target_temp(), 20.0);
    }

    struct StalledLink;

    #[async_trait]
    impl RegisterLink for StalledLink {
        async fn read_holding(&self, _start: u16, _count: u16) -> Result<Vec<u16>, ProtocolError> {
            std::future::pending().await
        }

        async fn write_register(&self, _address: u16, _value: u16) -> Result<(), ProtocolError> {
            std::future::pending().await
        }

        fn endpoint(&self) -> String {
            "stalled".into()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let master = ZoneMaster::new(7, Arc::new(StalledLink), Duration::from_millis(500));
        let err = master.read_snapshot().await.unwrap_err();
        assert_eq!(err, ProtocolError::Timeout(Duration::from_millis(500)));
        assert!(err.is_communication());
    }
}
