use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::RegisterLink;
use crate::domain::ZoneId;
use crate::modbus::{ProtocolError, RegisterStore};

/// In-process link straight into a simulator's register store.
pub struct LocalLink {
    zone_id: ZoneId,
    store: Arc<RegisterStore>,
    online: AtomicBool,
}

impl LocalLink {
    pub fn new(zone_id: ZoneId, store: Arc<RegisterStore>) -> Self {
        Self {
            zone_id,
            store,
            online: AtomicBool::new(true),
        }
    }

    /// Take the link down; requests then fail as a communication error.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), ProtocolError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProtocolError::Communication(format!(
                "zone {} link is offline",
                self.zone_id
            )))
        }
    }
}

#[async_trait]
impl RegisterLink for LocalLink {
    async fn read_holding(&self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        self.check_online()?;
        self.store.read(start, count)
    }

    async fn write_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        self.check_online()?;
        self.store.write(address, value)
    }

    fn endpoint(&self) -> String {
        format!("local://zone/{}", self.zone_id)
    }
}
