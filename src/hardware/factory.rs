use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{LocalLink, RegisterLink, ZoneMaster};
use crate::config::ZoneConfig;
use crate::modbus::RegisterStore;

/// How the controller reaches a zone's register bank.
///
/// `Tcp` is only usable with the `modbus` feature so that a build without it
/// can never open sockets to devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transport {
    /// Direct access to an in-process simulator store
    Local,
    /// Modbus TCP to the zone's configured endpoint
    Tcp,
}

/// Builds the link and master for each configured zone
pub struct LinkFactory {
    transport: Transport,
    call_timeout: Duration,
}

impl LinkFactory {
    pub fn new(transport: Transport, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// `store` is the zone's in-process register bank, required for `Local`.
    pub fn create_link(&self, zone: &ZoneConfig, store: Option<Arc<RegisterStore>>) -> Result<Arc<dyn RegisterLink>> {
        match self.transport {
            Transport::Local => {
                let store = store.ok_or_else(|| anyhow!("zone {} has no in-process simulator", zone.id))?;
                Ok(Arc::new(LocalLink::new(zone.id, store)))
            }
            Transport::Tcp => self.create_tcp_link(zone),
        }
    }

    #[cfg(feature = "modbus")]
    fn create_tcp_link(&self, zone: &ZoneConfig) -> Result<Arc<dyn RegisterLink>> {
        let addr = zone.socket_addr()?;
        tracing::debug!(zone_id = zone.id, %addr, unit_id = zone.unit_id, "creating modbus tcp link");
        Ok(Arc::new(super::modbus::ModbusTcpLink::new(
            addr,
            zone.unit_id,
            self.call_timeout,
        )))
    }

    #[cfg(not(feature = "modbus"))]
    fn create_tcp_link(&self, zone: &ZoneConfig) -> Result<Arc<dyn RegisterLink>> {
        Err(anyhow!(
            "zone {}: tcp transport requires the `modbus` feature",
            zone.id
        ))
    }

    pub fn create_master(&self, zone: &ZoneConfig, store: Option<Arc<RegisterStore>>) -> Result<ZoneMaster> {
        let link = self.create_link(zone, store)?;
        Ok(ZoneMaster::new(zone.id, link, self.call_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::RegisterSnapshot;

    fn zone() -> ZoneConfig {
        Config::from_toml_str(crate::config::tests::SAMPLE).unwrap().zones[0].clone()
    }

    fn store() -> Arc<RegisterStore> {
        Arc::new(
            RegisterStore::new(&RegisterSnapshot {
                current_temp: 19.0,
                target_temp: 21.0,
                occupancy: true,
                heater_on: true,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_local_master_reads_store() {
        let factory = LinkFactory::new(Transport::Local, Duration::from_secs(1));
        let master = factory.create_master(&zone(), Some(store())).unwrap();
        let snapshot = master.read_snapshot().await.unwrap();
        assert_eq!(snapshot.target_temp, 21.0);
        assert!(snapshot.heater_on);
    }

    #[test]
    fn test_local_requires_store() {
        let factory = LinkFactory::new(Transport::Local, Duration::from_secs(1));
        assert!(factory.create_link(&zone(), None).is_err());
    }

    #[cfg(feature = "modbus")]
    #[test]
    fn test_tcp_link_endpoint() {
        let factory = LinkFactory::new(Transport::Tcp, Duration::from_secs(1));
        let link = factory.create_link(&zone(), None).unwrap();
        assert!(link.endpoint().contains("127.0.0.1:5020"));
    }
}
