use serde::{Deserialize, Serialize};

/// Dead band around a target temperature.
///
/// The heater switches on below `target - width/2` and off above
/// `target + width/2`. Inside the band the previous state is held.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisBand {
    pub width_c: f64,
}

impl HysteresisBand {
    pub fn new(width_c: f64) -> Self {
        Self { width_c }
    }

    pub fn half(&self) -> f64 {
        self.width_c / 2.0
    }

    pub fn decide(&self, current_temp: f64, target_temp: f64, previous: bool) -> bool {
        if current_temp < target_temp - self.half() {
            true
        } else if current_temp > target_temp + self.half() {
            false
        } else {
            previous
        }
    }
}

/// Heater switch carrying its own previous state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisSwitch {
    band: HysteresisBand,
    on: bool,
}

impl HysteresisSwitch {
    pub fn new(band: HysteresisBand, initially_on: bool) -> Self {
        Self {
            band,
            on: initially_on,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn update(&mut self, current_temp: f64, target_temp: f64) -> bool {
        self.on = self.band.decide(current_temp, target_temp, self.on);
        self.on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_switches_on_below_band() {
        let band = HysteresisBand::new(0.5);
        assert!(band.decide(15.0, 17.0, false));
        assert!(band.decide(16.74, 17.0, false));
    }

    #[test]
    fn test_boundaries_hold_state() {
        let band = HysteresisBand::new(0.5);
        // Exactly on the edge is still inside the band
        assert!(!band.decide(16.75, 17.0, false));
        assert!(band.decide(17.25, 17.0, true));
    }

    #[test]
    fn test_switch_cycle() {
        let mut switch = HysteresisSwitch::new(HysteresisBand::new(1.0), false);
        let readings = [19.0, 19.4, 20.0, 20.4, 20.6, 20.2, 19.6, 19.4];
        let states: Vec<bool> = readings.iter().map(|&t| switch.update(t, 20.0)).collect();
        assert_eq!(states, vec![true, true, true, true, false, false, false, true]);
    }

    proptest! {
        #[test]
        fn inside_band_never_flips(
            target in 5.0_f64..30.0,
            width in 0.1_f64..3.0,
            offsets in prop::collection::vec(-0.49_f64..0.49, 1..50),
            initially_on: bool,
        ) {
            let mut switch = HysteresisSwitch::new(HysteresisBand::new(width), initially_on);
            for offset in offsets {
                prop_assert_eq!(switch.update(target + offset * width, target), initially_on);
            }
        }

        #[test]
        fn outside_band_is_forced(
            target in 5.0_f64..30.0,
            width in 0.1_f64..3.0,
            margin in 0.01_f64..5.0,
            previous: bool,
        ) {
            let band = HysteresisBand::new(width);
            prop_assert!(band.decide(target - band.half() - margin, target, previous));
            prop_assert!(!band.decide(target + band.half() + margin, target, previous));
        }
    }
}
