use parking_lot::RwLock;

use super::{parser, ProtocolError, Register, RegisterValue, REGISTER_COUNT, TEMPERATURE_SCALE};
use crate::domain::RegisterSnapshot;

type Bank = [u16; REGISTER_COUNT as usize];

/// In-memory holding register bank of one zone.
///
/// The simulator publishes current temperature, occupancy and heater status
/// as one set; the master reads any range and may only write the target
/// temperature. Every access takes the bank lock once, so a reader never
/// sees half of a publish.
#[derive(Debug)]
pub struct RegisterStore {
    bank: RwLock<Bank>,
}

impl RegisterStore {
    pub fn new(initial: &RegisterSnapshot) -> Result<Self, ProtocolError> {
        let bank = [
            parser::encode_scaled(initial.current_temp, TEMPERATURE_SCALE)?,
            parser::encode_scaled(initial.target_temp, TEMPERATURE_SCALE)?,
            parser::encode_flag(initial.occupancy),
            parser::encode_flag(initial.heater_on),
        ];
        Ok(Self {
            bank: RwLock::new(bank),
        })
    }

    pub fn snapshot(&self) -> RegisterSnapshot {
        let bank = *self.bank.read();
        decode_bank(&bank)
    }

    pub fn target_temp(&self) -> f64 {
        let raw = self.bank.read()[Register::TargetTemp.address() as usize];
        parser::parse_scaled_value(&[raw], TEMPERATURE_SCALE)
    }

    /// Simulator side: replace the simulator-owned registers in one critical section.
    pub fn publish(&self, current_temp: f64, occupancy: bool, heater_on: bool) -> Result<(), ProtocolError> {
        let current = parser::encode_scaled(current_temp, TEMPERATURE_SCALE)?;
        let mut bank = self.bank.write();
        bank[Register::CurrentTemp.address() as usize] = current;
        bank[Register::Occupancy.address() as usize] = parser::encode_flag(occupancy);
        bank[Register::HeaterStatus.address() as usize] = parser::encode_flag(heater_on);
        Ok(())
    }

    /// Master side: read `count` raw registers starting at `start`.
    pub fn read(&self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        let range = checked_range(start, count)?;
        Ok(self.bank.read()[range].to_vec())
    }

    /// Master side: write one raw register.
    pub fn write(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        self.write_many(address, &[value])
    }

    /// Master side: write a contiguous range. Rejected as a whole when any
    /// register in the range is simulator-owned.
    pub fn write_many(&self, start: u16, values: &[u16]) -> Result<(), ProtocolError> {
        let count = u16::try_from(values.len()).map_err(|_| ProtocolError::IllegalAddress {
            start,
            count: u16::MAX,
        })?;
        let range = checked_range(start, count)?;
        for address in range.clone() {
            let register = Register::from_address(address as u16).ok_or(ProtocolError::IllegalAddress { start, count })?;
            if !register.is_master_writable() {
                return Err(ProtocolError::ReadOnlyRegister(register));
            }
        }
        let mut bank = self.bank.write();
        bank[range].copy_from_slice(values);
        Ok(())
    }
}

fn checked_range(start: u16, count: u16) -> Result<std::ops::Range<usize>, ProtocolError> {
    let end = start as usize + count as usize;
    if count == 0 || end > REGISTER_COUNT as usize {
        return Err(ProtocolError::IllegalAddress { start, count });
    }
    Ok(start as usize..end)
}

/// Decode a full register bank (addresses 0..REGISTER_COUNT) into a snapshot.
pub fn decode_bank(bank: &[u16]) -> RegisterSnapshot {
    let value = |r: Register| RegisterValue::decode(r, bank.get(r.address() as usize).copied().unwrap_or(0));
    RegisterSnapshot {
        current_temp: value(Register::CurrentTemp).as_temperature().unwrap_or_default(),
        target_temp: value(Register::TargetTemp).as_temperature().unwrap_or_default(),
        occupancy: value(Register::Occupancy).as_flag().unwrap_or_default(),
        heater_on: value(Register::HeaterStatus).as_flag().unwrap_or_default(),
    }
}
