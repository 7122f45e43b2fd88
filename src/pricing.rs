//! Energy price levels by time of day.

use chrono::{DateTime, Timelike, Utc};

use crate::domain::PriceLevel;

/// Pure, total price lookup.
pub trait EnergyPricer: Send + Sync {
    fn price_level(&self, at: DateTime<Utc>) -> PriceLevel;
}

/// Fixed time-of-use tariff on UTC hours: off-peak overnight, peak in the
/// evening, standard otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfUseTariff {
    /// Off-peak from midnight up to this hour (exclusive)
    pub off_peak_until_hour: u32,
    /// Peak window `[start, end)`
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
}

impl Default for TimeOfUseTariff {
    fn default() -> Self {
        Self {
            off_peak_until_hour: 7,
            peak_start_hour: 17,
            peak_end_hour: 21,
        }
    }
}

impl EnergyPricer for TimeOfUseTariff {
    fn price_level(&self, at: DateTime<Utc>) -> PriceLevel {
        let hour = at.hour();
        if hour < self.off_peak_until_hour {
            PriceLevel::OffPeak
        } else if (self.peak_start_hour..self.peak_end_hour).contains(&hour) {
            PriceLevel::Peak
        } else {
            PriceLevel::Standard
        }
    }
}
