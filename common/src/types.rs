use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    error::InputError, learning::LearningPhase, pid::Gains, pid::PidTerms,
    schedule::ScheduleSlotInfo, target::TargetSource,
};

/// Which directions the plant can be driven in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalMode {
    Heat,
    Cool,
    HeatCool,
}

impl ThermalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
        }
    }

    /// Direction assumed before any error has been observed.
    pub fn default_active(self) -> ActiveMode {
        match self {
            Self::Cool => ActiveMode::Cool,
            Self::Heat | Self::HeatCool => ActiveMode::Heat,
        }
    }
}

impl FromStr for ThermalMode {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "heat" => Ok(Self::Heat),
            "cool" => Ok(Self::Cool),
            "heat_cool" | "heatcool" => Ok(Self::HeatCool),
            _ => Err(InputError::UnknownMode(value.to_string())),
        }
    }
}

/// Direction currently in force; for `heat_cool` it follows the sign of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveMode {
    Heat,
    Cool,
}

impl ActiveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Manual,
    Schedule,
    Off,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Off => "off",
        }
    }
}

impl FromStr for OperatingMode {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "schedule" => Ok(Self::Schedule),
            "off" => Ok(Self::Off),
            _ => Err(InputError::UnknownMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Heating,
    Cooling,
    Stable,
    Unknown,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heating => "heating",
            Self::Cooling => "cooling",
            Self::Stable => "stable",
            Self::Unknown => "unknown",
        }
    }
}

/// Per-sample diagnostics returned alongside the setpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRecord {
    pub current_temp: f64,
    pub target_temp: f64,
    pub base_target_temp: f64,
    pub setpoint: f64,
    pub error: f64,
    pub trend: Trend,
    pub thermal_mode: ThermalMode,
    pub active_mode: ActiveMode,
    pub precision: f64,
    pub learning_phase: LearningPhase,
    pub gains: Gains,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<PidTerms>,
    pub operating_mode: OperatingMode,
    pub target_source: TargetSource,
    pub schedule_active: bool,
    pub schedule_slot: Option<ScheduleSlotInfo>,
    pub boost_active: bool,
    pub boost_remaining_min: u64,
    pub away_active: bool,
    pub away_temp: Option<f64>,
    pub heating_active: bool,
    pub cooling_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub setpoint: f64,
    pub actuator_active: bool,
    pub debug: DebugRecord,
}

/// Projection of the engine without processing a new sample. Values that
/// only exist once a reading has been seen are `None` until then.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub current_temp: Option<f64>,
    pub target_temp: f64,
    pub base_target_temp: f64,
    pub setpoint: Option<f64>,
    pub error: Option<f64>,
    pub trend: Trend,
    pub thermal_mode: ThermalMode,
    pub active_mode: ActiveMode,
    pub operating_mode: OperatingMode,
    pub precision: f64,
    pub hysteresis: f64,
    pub learning_phase: LearningPhase,
    pub gains: Gains,
    pub target_source: TargetSource,
    pub heating_active: bool,
    pub cooling_active: bool,
    pub actuator_active: bool,
    pub schedule_active: bool,
    pub schedule_slot: Option<ScheduleSlotInfo>,
    #[serde(rename = "nextScheduleEventEpoch")]
    pub next_schedule_event_epoch: Option<i64>,
    pub timezone: String,
    pub boost_active: bool,
    pub boost_remaining_min: u64,
    pub away_active: bool,
    pub away_temp: Option<f64>,
    #[serde(rename = "lastUpdateEpoch")]
    pub last_update_epoch: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("HEAT".parse::<ThermalMode>(), Ok(ThermalMode::Heat));
        assert_eq!(" heat_cool ".parse::<ThermalMode>(), Ok(ThermalMode::HeatCool));
        assert_eq!("Schedule".parse::<OperatingMode>(), Ok(OperatingMode::Schedule));
        assert_eq!(
            "auto".parse::<OperatingMode>(),
            Err(InputError::UnknownMode("auto".to_string()))
        );
    }

    #[test]
    fn heat_cool_starts_in_heat_direction() {
        assert_eq!(ThermalMode::HeatCool.default_active(), ActiveMode::Heat);
        assert_eq!(ThermalMode::Cool.default_active(), ActiveMode::Cool);
    }
}
