use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::ControllerConfig,
    schedule::{Schedule, ScheduleMatch},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostState {
    pub temperature: f64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AwayState {
    pub temperature: f64,
}

/// Temporary overrides layered over the schedule and manual target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideState {
    pub boost: Option<BoostState>,
    pub away: Option<AwayState>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoostCommand {
    Cancel,
    Start {
        temperature: f64,
        duration_minutes: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AwayCommand {
    Off,
    /// Away with the configured default ceiling.
    On,
    At(f64),
}

impl OverrideState {
    pub fn active_boost(&self, now: DateTime<Utc>) -> Option<BoostState> {
        self.boost.filter(|boost| now < boost.expires_at)
    }

    pub fn boost_remaining_min(&self, now: DateTime<Utc>) -> u64 {
        self.active_boost(now)
            .map(|boost| {
                let remaining_secs = (boost.expires_at - now).num_seconds().max(0) as u64;
                remaining_secs.div_ceil(60)
            })
            .unwrap_or(0)
    }

    /// Drops a boost whose expiry has passed. Returns true when one was dropped.
    pub fn expire_boost(&mut self, now: DateTime<Utc>) -> bool {
        match self.boost {
            Some(boost) if now >= boost.expires_at => {
                self.boost = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSource {
    Boost,
    Away,
    Schedule,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetResolution {
    pub target: f64,
    pub source: TargetSource,
    /// Evaluated even when a boost wins, so callers can report it.
    pub schedule: Option<ScheduleMatch>,
}

/// Boost beats everything; away caps whichever of schedule or manual target
/// applies; the result is always inside the configured bounds.
pub fn resolve_effective_target(
    config: &ControllerConfig,
    schedule: Option<&Schedule>,
    overrides: &OverrideState,
    now: DateTime<Utc>,
) -> TargetResolution {
    let schedule_match = schedule.and_then(|schedule| schedule.resolve(now));

    if let Some(boost) = overrides.active_boost(now) {
        return TargetResolution {
            target: config.clamp_temp(boost.temperature),
            source: TargetSource::Boost,
            schedule: schedule_match,
        };
    }

    let (mut target, mut source) = match schedule_match {
        Some(matched) => (matched.temperature, TargetSource::Schedule),
        None => (config.target_temp, TargetSource::Manual),
    };

    if let Some(away) = overrides.away {
        if away.temperature < target {
            target = away.temperature;
            source = TargetSource::Away;
        }
    }

    TargetResolution {
        target: config.clamp_temp(target),
        source,
        schedule: schedule_match,
    }
}
