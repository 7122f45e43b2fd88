use serde::{Deserialize, Serialize};

/// Energy price band for a point in time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceLevel {
    OffPeak,
    Standard,
    Peak,
    SuperPeak,
}

impl PriceLevel {
    /// Price per kWh (EUR)
    pub fn price_per_kwh(self) -> f64 {
        match self {
            PriceLevel::OffPeak => 0.10,
            PriceLevel::Standard => 0.18,
            PriceLevel::Peak => 0.25,
            PriceLevel::SuperPeak => 0.40,
        }
    }
}
