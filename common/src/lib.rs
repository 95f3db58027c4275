pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod latch;
pub mod learning;
pub mod pid;
pub mod schedule;
pub mod shaper;
pub mod snapshot;
pub mod target;
pub mod thermostat;
pub mod types;

pub use clock::TimezoneSelector;
pub use config::ControllerConfig;
pub use error::InputError;
pub use learning::LearningPhase;
pub use pid::{Gains, PidTerms};
pub use schedule::{DayOfWeek, Schedule, ScheduleSlot, ScheduleSlotInfo};
pub use snapshot::ControllerSnapshot;
pub use target::{AwayCommand, BoostCommand, OverrideState, TargetSource};
pub use thermostat::ThermostatEngine;
pub use types::{
    ActiveMode, ControllerStatus, DebugRecord, OperatingMode, ThermalMode, Trend, UpdateResult,
};
