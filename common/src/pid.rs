use serde::{Deserialize, Serialize};

use crate::types::ActiveMode;

pub const KP_MIN: f64 = 0.1;
pub const KP_MAX: f64 = 5.0;
pub const KI_MIN: f64 = 0.001;
pub const KI_MAX: f64 = 0.5;
pub const KD_MIN: f64 = 0.0;
pub const KD_MAX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.01,
            kd: 0.05,
        }
    }
}

impl Gains {
    pub fn clamped(self) -> Self {
        Self {
            kp: self.kp.clamp(KP_MIN, KP_MAX),
            ki: self.ki.clamp(KI_MIN, KI_MAX),
            kd: self.kd.clamp(KD_MIN, KD_MAX),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub adjustment: f64,
}

/// True when the room is already past the target in the direction the mode
/// pushes, so the plant should coast instead of being driven.
pub fn is_mode_mismatch(mode: ActiveMode, error: f64) -> bool {
    match mode {
        ActiveMode::Heat => error < 0.0,
        ActiveMode::Cool => error > 0.0,
    }
}

/// One PID step. `error` is `target - current`; the returned adjustment is a
/// magnitude and the setpoint shaper applies the direction.
///
/// The accumulator integrates error signed by the active direction and is
/// clamped to `[0, integral_limit]`, so an overshoot drains it instead of
/// letting it go negative.
pub fn compute_pid(
    error: f64,
    last_error: Option<f64>,
    dt_secs: f64,
    mode: ActiveMode,
    gains: &Gains,
    integral: &mut f64,
    integral_limit: f64,
) -> PidTerms {
    let p = gains.kp * error.abs();

    let directed = match mode {
        ActiveMode::Heat => error,
        ActiveMode::Cool => -error,
    };
    *integral = (*integral + directed * dt_secs).clamp(0.0, integral_limit.max(0.0));
    let i = gains.ki * *integral;

    let d = match last_error {
        Some(last) if dt_secs > 0.0 => gains.kd * (error.abs() - last.abs()) / dt_secs,
        _ => 0.0,
    };

    PidTerms {
        p,
        i,
        d,
        adjustment: p + i + d,
    }
}

/// Bleeds the accumulator while the plant coasts past the target.
pub fn relax_integral(integral: &mut f64, error: f64) {
    *integral = (*integral - error.abs()).max(0.0);
}
