use serde::{Deserialize, Serialize};

use crate::{
    pid::Gains,
    types::{OperatingMode, ThermalMode},
};

/// Actuator resolutions the setpoint can be rounded to.
pub const PRECISION_STEPS: [f64; 4] = [1.0, 0.5, 0.2, 0.1];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub min_temp: f64,
    pub max_temp: f64,
    /// Manual base target, the lowest-priority source.
    pub target_temp: f64,
    pub hysteresis: f64,
    pub sample_interval_secs: u64,
    pub precision: f64,
    /// Largest setpoint move allowed between two consecutive cycles.
    pub max_output_change: f64,
    pub thermal_mode: ThermalMode,
    pub operating_mode: OperatingMode,
    pub away_temp: f64,
    pub initial_gains: Gains,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_temp: 15.0,
            max_temp: 30.0,
            target_temp: 21.0,
            hysteresis: 0.2,
            sample_interval_secs: 60,
            precision: 0.5,
            max_output_change: 2.0,
            thermal_mode: ThermalMode::Heat,
            operating_mode: OperatingMode::Manual,
            away_temp: 16.0,
            initial_gains: Gains::default(),
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if !self.min_temp.is_finite() || !self.max_temp.is_finite() || self.min_temp == self.max_temp
        {
            self.min_temp = defaults.min_temp;
            self.max_temp = defaults.max_temp;
        } else if self.min_temp > self.max_temp {
            std::mem::swap(&mut self.min_temp, &mut self.max_temp);
        }

        self.precision = nearest_precision(self.precision);

        self.hysteresis = if self.hysteresis.is_finite() {
            self.hysteresis.max(0.0)
        } else {
            defaults.hysteresis
        };

        if !self.max_output_change.is_finite() || self.max_output_change <= 0.0 {
            self.max_output_change = defaults.max_output_change;
        }

        if self.sample_interval_secs == 0 {
            self.sample_interval_secs = defaults.sample_interval_secs;
        }

        self.target_temp = self.sanitize_temp(self.target_temp);
        self.away_temp = self.sanitize_temp(self.away_temp);
        self.initial_gains = if self.initial_gains.is_finite() {
            self.initial_gains.clamped()
        } else {
            defaults.initial_gains
        };
    }

    pub fn clamp_temp(&self, temp: f64) -> f64 {
        temp.clamp(self.min_temp, self.max_temp)
    }

    pub fn contains(&self, temp: f64) -> bool {
        (self.min_temp..=self.max_temp).contains(&temp)
    }

    pub fn sample_interval_secs_f64(&self) -> f64 {
        self.sample_interval_secs as f64
    }

    /// Upper anti-windup bound for the integral accumulator.
    pub fn integral_limit(&self, ki: f64) -> f64 {
        if ki <= 0.0 {
            return 0.0;
        }
        (self.max_temp - self.min_temp) / (2.0 * ki)
    }

    fn sanitize_temp(&self, temp: f64) -> f64 {
        if temp.is_finite() {
            self.clamp_temp(temp)
        } else {
            (self.min_temp + self.max_temp) / 2.0
        }
    }
}

pub fn is_supported_precision(step: f64) -> bool {
    PRECISION_STEPS
        .iter()
        .any(|supported| (supported - step).abs() < 1e-9)
}

/// Snaps an arbitrary step to the closest supported actuator resolution.
pub fn nearest_precision(step: f64) -> f64 {
    if !step.is_finite() || step <= 0.0 {
        return ControllerConfig::default().precision;
    }
    PRECISION_STEPS
        .iter()
        .copied()
        .min_by(|a, b| (a - step).abs().total_cmp(&(b - step).abs()))
        .unwrap_or(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_repairs_inverted_bounds_and_precision() {
        let mut config = ControllerConfig {
            min_temp: 28.0,
            max_temp: 12.0,
            precision: 0.3,
            hysteresis: -1.0,
            max_output_change: 0.0,
            target_temp: 40.0,
            ..ControllerConfig::default()
        };
        config.sanitize();

        assert_eq!(config.min_temp, 12.0);
        assert_eq!(config.max_temp, 28.0);
        assert_eq!(config.precision, 0.2);
        assert_eq!(config.hysteresis, 0.0);
        assert_eq!(config.max_output_change, 2.0);
        assert_eq!(config.target_temp, 28.0);
    }

    #[test]
    fn sanitize_falls_back_on_degenerate_bounds() {
        let mut config = ControllerConfig {
            min_temp: 20.0,
            max_temp: 20.0,
            ..ControllerConfig::default()
        };
        config.sanitize();

        assert_eq!(config.min_temp, 15.0);
        assert_eq!(config.max_temp, 30.0);
    }

    #[test]
    fn partial_config_json_uses_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"min_temp": 10.0, "thermal_mode": "cool"}"#).unwrap();

        assert_eq!(config.min_temp, 10.0);
        assert_eq!(config.max_temp, 30.0);
        assert_eq!(config.thermal_mode, ThermalMode::Cool);
    }

    #[test]
    fn integral_limit_spans_half_the_range() {
        let config = ControllerConfig {
            min_temp: 15.0,
            max_temp: 25.0,
            ..ControllerConfig::default()
        };

        assert_eq!(config.integral_limit(0.01), 500.0);
        assert_eq!(config.integral_limit(0.0), 0.0);
    }
}
