use serde::{Deserialize, Serialize};

use crate::types::{OperatingMode, ThermalMode, Trend};

/// Inputs for one latch evaluation. `error` is `target - current`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatchInput {
    pub error: f64,
    pub setpoint: f64,
    pub target: f64,
    pub precision: f64,
    pub hysteresis: f64,
    pub trend: Trend,
}

/// Inside the dead band, independent of the trend label.
pub fn is_stable(error: f64, hysteresis: f64) -> bool {
    error.abs() < hysteresis
}

/// "Actuator should run" state per direction, held across cycles so the
/// output only flips once the error leaves the dead band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationLatch {
    pub heating: bool,
    pub cooling: bool,
}

impl ActivationLatch {
    pub fn is_active(&self) -> bool {
        self.heating || self.cooling
    }

    pub fn release(&mut self) {
        self.heating = false;
        self.cooling = false;
    }

    pub fn evaluate(&mut self, thermal_mode: ThermalMode, operating_mode: OperatingMode, input: &LatchInput) -> bool {
        if operating_mode == OperatingMode::Off {
            self.release();
            return false;
        }

        self.heating = match thermal_mode {
            ThermalMode::Heat | ThermalMode::HeatCool => next_heating(self.heating, input),
            ThermalMode::Cool => false,
        };
        self.cooling = match thermal_mode {
            ThermalMode::Cool | ThermalMode::HeatCool => next_cooling(self.cooling, input),
            ThermalMode::Heat => false,
        };

        self.is_active()
    }
}

fn next_heating(current: bool, input: &LatchInput) -> bool {
    if input.error <= 0.0 {
        return false;
    }
    if input.error > input.hysteresis {
        return true;
    }
    // Falling towards the band edge while the setpoint is already pushing:
    // start before the band is crossed.
    let proactive = input.setpoint > input.target + input.precision && input.trend == Trend::Cooling;
    current || proactive
}

fn next_cooling(current: bool, input: &LatchInput) -> bool {
    if input.error >= 0.0 {
        return false;
    }
    if input.error < -input.hysteresis {
        return true;
    }
    let proactive = input.setpoint < input.target - input.precision && input.trend == Trend::Heating;
    current || proactive
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(current: f64, setpoint: f64, trend: Trend) -> LatchInput {
        LatchInput {
            error: 21.0 - current,
            setpoint,
            target: 21.0,
            precision: 0.5,
            hysteresis: 0.2,
            trend,
        }
    }

    #[test]
    fn heating_turns_on_outside_band_and_off_at_target() {
        let mut latch = ActivationLatch::default();

        assert!(latch.evaluate(ThermalMode::Heat, OperatingMode::Manual, &input(20.0, 22.5, Trend::Stable)));
        assert!(latch.heating);

        // Inside the band the latch holds.
        assert!(latch.evaluate(ThermalMode::Heat, OperatingMode::Manual, &input(20.9, 21.0, Trend::Heating)));

        assert!(!latch.evaluate(ThermalMode::Heat, OperatingMode::Manual, &input(21.0, 21.0, Trend::Heating)));
        assert!(!latch.heating);

        // Back inside the band from above: stays off.
        assert!(!latch.evaluate(ThermalMode::Heat, OperatingMode::Manual, &input(20.9, 21.0, Trend::Stable)));
    }

    #[test]
    fn heating_starts_proactively_when_cooling_inside_band() {
        let mut latch = ActivationLatch::default();

        assert!(!latch.evaluate(ThermalMode::Heat, OperatingMode::Manual, &input(20.9, 21.5, Trend::Cooling)));
        assert!(latch.evaluate(ThermalMode::Heat, OperatingMode::Manual, &input(20.9, 22.0, Trend::Cooling)));
        assert!(latch.heating);
    }

    #[test]
    fn cooling_mirrors_heating() {
        let mut latch = ActivationLatch::default();

        assert!(latch.evaluate(ThermalMode::Cool, OperatingMode::Manual, &input(21.5, 20.0, Trend::Stable)));
        assert!(latch.cooling);
        assert!(!latch.heating);

        assert!(latch.evaluate(ThermalMode::Cool, OperatingMode::Manual, &input(21.1, 21.0, Trend::Stable)));
        assert!(!latch.evaluate(ThermalMode::Cool, OperatingMode::Manual, &input(20.9, 21.0, Trend::Stable)));

        let mut latch = ActivationLatch::default();
        assert!(latch.evaluate(ThermalMode::Cool, OperatingMode::Manual, &input(21.1, 20.0, Trend::Heating)));
    }

    #[test]
    fn heat_cool_runs_both_directions() {
        let mut latch = ActivationLatch::default();

        latch.evaluate(ThermalMode::HeatCool, OperatingMode::Manual, &input(20.0, 22.0, Trend::Stable));
        assert_eq!(latch, ActivationLatch { heating: true, cooling: false });

        latch.evaluate(ThermalMode::HeatCool, OperatingMode::Manual, &input(22.0, 20.0, Trend::Stable));
        assert_eq!(latch, ActivationLatch { heating: false, cooling: true });
    }

    #[test]
    fn off_mode_forces_both_inactive() {
        let mut latch = ActivationLatch {
            heating: true,
            cooling: true,
        };

        assert!(!latch.evaluate(ThermalMode::HeatCool, OperatingMode::Off, &input(18.0, 22.0, Trend::Cooling)));
        assert_eq!(latch, ActivationLatch::default());
    }

    #[test]
    fn stability_is_error_magnitude_only() {
        assert!(is_stable(0.05, 0.2));
        assert!(is_stable(-0.19, 0.2));
        assert!(!is_stable(0.2, 0.2));
    }
}
