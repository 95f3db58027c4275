use crate::{config::ControllerConfig, types::ActiveMode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeRequest {
    pub target: f64,
    /// Unbounded setpoint before any shaping.
    pub raw: f64,
    pub mode: ActiveMode,
    /// Push the setpoint at least one precision step past the target.
    pub enforce_min_step: bool,
    pub previous: Option<f64>,
}

pub fn raw_setpoint(target: f64, adjustment: f64, mode: ActiveMode) -> f64 {
    match mode {
        ActiveMode::Heat => target + adjustment,
        ActiveMode::Cool => target - adjustment,
    }
}

/// Turns a raw PID setpoint into something the actuator can act on: minimum
/// step, rate limit, bounds, then precision rounding.
pub fn shape_setpoint(config: &ControllerConfig, request: ShapeRequest) -> f64 {
    let mut setpoint = request.raw;

    if request.enforce_min_step {
        setpoint = match request.mode {
            ActiveMode::Heat => setpoint.max(request.target + config.precision),
            ActiveMode::Cool => setpoint.min(request.target - config.precision),
        };
    }

    setpoint = rate_limit(setpoint, request.previous, config.max_output_change);
    round_within_bounds(config, setpoint)
}

/// Clamps and rounds, pulling the result back onto the innermost grid step
/// when a bound is not itself a multiple of the precision.
pub fn round_within_bounds(config: &ControllerConfig, value: f64) -> f64 {
    let precision = config.precision;
    let rounded = round_to_precision(config.clamp_temp(value), precision);
    if precision <= 0.0 || config.contains(rounded) {
        return rounded;
    }

    let lowest = round_to_precision((config.min_temp / precision - 1e-9).ceil() * precision, precision);
    let highest = round_to_precision((config.max_temp / precision + 1e-9).floor() * precision, precision);
    if lowest > highest {
        // No grid step fits between the bounds.
        return config.clamp_temp(value);
    }
    rounded.clamp(lowest, highest)
}

pub fn rate_limit(setpoint: f64, previous: Option<f64>, max_change: f64) -> f64 {
    match previous {
        Some(previous) => setpoint.clamp(previous - max_change, previous + max_change),
        None => setpoint,
    }
}

/// Nearest multiple of `precision`, with float noise trimmed.
pub fn round_to_precision(value: f64, precision: f64) -> f64 {
    if precision <= 0.0 {
        return value;
    }
    let rounded = (value / precision).round() * precision;
    (rounded * 1_000.0).round() / 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ControllerConfig {
        ControllerConfig {
            min_temp: 15.0,
            max_temp: 25.0,
            precision: 0.5,
            max_output_change: 1.0,
            ..ControllerConfig::default()
        }
    }

    fn request(raw: f64, mode: ActiveMode, enforce_min_step: bool, previous: Option<f64>) -> ShapeRequest {
        ShapeRequest {
            target: 21.0,
            raw,
            mode,
            enforce_min_step,
            previous,
        }
    }

    #[test]
    fn min_step_applies_only_outside_band() {
        let config = config();

        let heating = shape_setpoint(&config, request(21.1, ActiveMode::Heat, true, None));
        assert_eq!(heating, 21.5);

        let cooling = shape_setpoint(&config, request(20.9, ActiveMode::Cool, true, None));
        assert_eq!(cooling, 20.5);

        let settled = shape_setpoint(&config, request(21.1, ActiveMode::Heat, false, None));
        assert_eq!(settled, 21.0);
    }

    #[test]
    fn rate_limit_follows_raw_direction() {
        let config = config();

        let up = shape_setpoint(&config, request(24.0, ActiveMode::Heat, true, Some(21.0)));
        assert_eq!(up, 22.0);

        let down = shape_setpoint(&config, request(18.0, ActiveMode::Cool, true, Some(21.0)));
        assert_eq!(down, 20.0);
    }

    #[test]
    fn clamps_to_bounds() {
        let config = config();

        assert_eq!(shape_setpoint(&config, request(40.0, ActiveMode::Heat, true, None)), 25.0);
        assert_eq!(shape_setpoint(&config, request(2.0, ActiveMode::Cool, true, None)), 15.0);
    }

    #[test]
    fn off_grid_bounds_keep_setpoint_inside() {
        let config = ControllerConfig {
            min_temp: 15.3,
            max_temp: 24.6,
            precision: 1.0,
            ..config()
        };

        assert_eq!(shape_setpoint(&config, request(14.0, ActiveMode::Cool, true, None)), 16.0);
        assert_eq!(shape_setpoint(&config, request(30.0, ActiveMode::Heat, true, None)), 24.0);
        assert_eq!(round_within_bounds(&config, 20.4), 20.0);

        let narrow = ControllerConfig {
            min_temp: 15.2,
            max_temp: 15.8,
            ..config
        };
        assert_eq!(round_within_bounds(&narrow, 30.0), 15.8);
    }

    #[test]
    fn raw_setpoint_direction() {
        assert_eq!(raw_setpoint(21.0, 1.5, ActiveMode::Heat), 22.5);
        assert_eq!(raw_setpoint(21.0, 1.5, ActiveMode::Cool), 19.5);
    }

    #[test]
    fn rounding_lands_on_a_nearby_multiple() {
        for precision in [1.0, 0.5, 0.2, 0.1] {
            let mut value = 14.0;
            while value < 26.0 {
                let rounded = round_to_precision(value, precision);
                let steps = rounded / precision;
                assert!((steps - steps.round()).abs() < 1e-6, "{rounded} not a multiple of {precision}");
                assert!((rounded - value).abs() <= precision / 2.0 + 1e-9);
                value += 0.037;
            }
        }
        assert_eq!(round_to_precision(21.05, 0.5), 21.0);
        assert_eq!(round_to_precision(21.3, 0.1), 21.3);
    }
}
