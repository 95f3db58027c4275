use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    history::TemperatureSample,
    latch::ActivationLatch,
    pid::Gains,
    schedule::Schedule,
    target::OverrideState,
    types::{ActiveMode, OperatingMode, ThermalMode},
};

/// Everything needed to rehydrate an engine. Every field is optional so an
/// older or partial blob restores what it has and leaves the rest alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gains: Option<Gains>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integral: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_setpoint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_mode: Option<ActiveMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latch: Option<ActivationLatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_history: Option<Vec<TemperatureSample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_history: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_samples: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_samples: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<OverrideState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_mode: Option<ThermalMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_mode: Option<OperatingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hysteresis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
}

impl ControllerSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_partial_blobs_parse() {
        assert_eq!(ControllerSnapshot::from_json("{}").unwrap(), ControllerSnapshot::default());

        let partial = ControllerSnapshot::from_json(
            r#"{"gains": {"kp": 2.0, "ki": 0.02, "kd": 0.1}, "tuned": true, "unknownField": 1}"#,
        )
        .unwrap();

        assert_eq!(
            partial.gains,
            Some(Gains {
                kp: 2.0,
                ki: 0.02,
                kd: 0.1,
            })
        );
        assert_eq!(partial.tuned, Some(true));
        assert_eq!(partial.integral, None);
    }

    #[test]
    fn omits_unset_fields() {
        let snapshot = ControllerSnapshot {
            integral: Some(12.5),
            ..ControllerSnapshot::default()
        };

        assert_eq!(snapshot.to_json().unwrap(), "{\n  \"integral\": 12.5\n}");
    }
}
