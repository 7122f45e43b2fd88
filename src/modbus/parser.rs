//! Register value conversion utilities

use super::ProtocolError;

/// Parse u16 from register
pub fn parse_u16(registers: &[u16]) -> u16 {
    registers.first().copied().unwrap_or(0)
}

/// Parse i16 from register
pub fn parse_i16(registers: &[u16]) -> i16 {
    parse_u16(registers) as i16
}

/// Parse scaled value (signed register value * scale factor)
pub fn parse_scaled_value(registers: &[u16], scale: f64) -> f64 {
    let raw = parse_i16(registers) as f64;
    if scale > 0.0 && scale < 1.0 {
        // Integer divisor keeps decimal readings exact (3 -> 0.3, not 0.30000000000000004)
        raw / (1.0 / scale).round()
    } else {
        raw * scale
    }
}

/// Any non-zero register reads as `true`
pub fn parse_flag(raw: u16) -> bool {
    raw != 0
}

pub fn encode_flag(value: bool) -> u16 {
    u16::from(value)
}

/// Encode a value as a signed, scaled register (rounded to the nearest step)
pub fn encode_scaled(value: f64, scale: f64) -> Result<u16, ProtocolError> {
    if !value.is_finite() {
        return Err(ProtocolError::ValueOutOfRange(value));
    }
    let steps = (value / scale).round();
    if steps < i16::MIN as f64 || steps > i16::MAX as f64 {
        return Err(ProtocolError::ValueOutOfRange(value));
    }
    Ok(steps as i16 as u16)
}
