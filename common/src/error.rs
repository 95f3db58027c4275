use thiserror::Error;

/// Reason a setter or reading was rejected. The engine state is left
/// untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("unknown mode '{0}'")]
    UnknownMode(String),
    #[error("precision {0} is not one of 1, 0.5, 0.2 or 0.1")]
    UnsupportedPrecision(f64),
    #[error("schedule slot on {day} is invalid: {reason}")]
    InvalidSchedule { day: &'static str, reason: String },
    #[error("boost duration must be a positive number of minutes")]
    InvalidDuration,
}
