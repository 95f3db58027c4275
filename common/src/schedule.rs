use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::{clock::TimezoneSelector, error::InputError};

const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    #[serde(alias = "mon")]
    Monday,
    #[serde(alias = "tue")]
    Tuesday,
    #[serde(alias = "wed")]
    Wednesday,
    #[serde(alias = "thu")]
    Thursday,
    #[serde(alias = "fri")]
    Friday,
    #[serde(alias = "sat")]
    Saturday,
    #[serde(alias = "sun")]
    Sunday,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 7 {
            0 => Self::Monday,
            1 => Self::Tuesday,
            2 => Self::Wednesday,
            3 => Self::Thursday,
            4 => Self::Friday,
            5 => Self::Saturday,
            _ => Self::Sunday,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    fn previous(self) -> Self {
        Self::from_index(self.index() + 6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    #[serde(rename = "time", with = "hhmm")]
    pub start_minutes: u16,
    #[serde(rename = "temp", alias = "temperature")]
    pub temperature: f64,
}

impl ScheduleSlot {
    pub fn validate(&self) -> Result<(), String> {
        if self.start_minutes >= MINUTES_PER_DAY {
            return Err(format!("start minute {} is past midnight", self.start_minutes));
        }
        if !self.temperature.is_finite() {
            return Err("temperature must be a finite number".to_string());
        }
        Ok(())
    }
}

/// Weekly program. Slots hold from their start time until the next slot,
/// carrying over midnight into the following day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub days: BTreeMap<DayOfWeek, Vec<ScheduleSlot>>,
    #[serde(default, rename = "defaultTemp", skip_serializing_if = "Option::is_none")]
    pub default_temp: Option<f64>,
    #[serde(default)]
    pub timezone: TimezoneSelector,
}

/// The schedule value in force right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleMatch {
    /// `None` when the default fallback temperature applied.
    pub slot: Option<(DayOfWeek, ScheduleSlot)>,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleSlotInfo {
    pub day: DayOfWeek,
    pub time: String,
    pub temp: f64,
}

impl ScheduleMatch {
    pub fn slot_info(&self) -> Option<ScheduleSlotInfo> {
        self.slot.map(|(day, slot)| ScheduleSlotInfo {
            day,
            time: format_hhmm(slot.start_minutes),
            temp: slot.temperature,
        })
    }
}

impl Schedule {
    pub fn validate(&self) -> Result<(), InputError> {
        for (day, slots) in &self.days {
            for slot in slots {
                slot.validate()
                    .map_err(|reason| InputError::InvalidSchedule {
                        day: day.as_str(),
                        reason,
                    })?;
            }
        }
        if let Some(default_temp) = self.default_temp {
            if !default_temp.is_finite() {
                return Err(InputError::NotFinite {
                    field: "schedule default temperature",
                });
            }
        }
        Ok(())
    }

    pub fn normalize(&mut self) {
        for slots in self.days.values_mut() {
            slots.retain(|slot| slot.validate().is_ok());
            slots.sort_by_key(|slot| slot.start_minutes);
        }
        self.days.retain(|_, slots| !slots.is_empty());
        if self.default_temp.is_some_and(|temp| !temp.is_finite()) {
            self.default_temp = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(Vec::is_empty)
    }

    /// Evaluates the program at `now` in the schedule's own timezone.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<ScheduleMatch> {
        self.current_slot(self.timezone.localize(now))
    }

    pub fn current_slot(&self, now: DateTime<FixedOffset>) -> Option<ScheduleMatch> {
        let day = DayOfWeek::from_chrono(now.weekday());
        let current_minutes = now.hour() as u16 * 60 + now.minute() as u16;

        // Current day, last slot <= now.
        let mut best = self.slots(day).and_then(|slots| {
            slots
                .iter()
                .filter(|slot| slot.start_minutes <= current_minutes)
                .max_by_key(|slot| slot.start_minutes)
                .map(|slot| (day, *slot))
        });

        // Carry the last slot of earlier days across midnight.
        let mut candidate_day = day;
        for _ in 0..7 {
            if best.is_some() {
                break;
            }
            candidate_day = candidate_day.previous();
            best = self.slots(candidate_day).and_then(|slots| {
                slots
                    .iter()
                    .max_by_key(|slot| slot.start_minutes)
                    .map(|slot| (candidate_day, *slot))
            });
        }

        match best {
            Some((day, slot)) => Some(ScheduleMatch {
                slot: Some((day, slot)),
                temperature: slot.temperature,
            }),
            None => self.default_temp.map(|temperature| ScheduleMatch {
                slot: None,
                temperature,
            }),
        }
    }

    /// Epoch seconds of the next slot start strictly after `now`, looking at
    /// most one week ahead. Feeds `ControllerStatus::next_schedule_event_epoch`.
    pub fn next_event_epoch(&self, now: DateTime<Utc>) -> Option<i64> {
        let local = self.timezone.localize(now);
        let today = DayOfWeek::from_chrono(local.weekday());
        let minute_of_day = (local.hour() * 60 + local.minute()) as u16;

        (0..=7u8)
            .flat_map(|offset| {
                let day = DayOfWeek::from_index(today.index() + usize::from(offset));
                self.slots(day)
                    .into_iter()
                    .flatten()
                    .map(move |slot| (offset, *slot))
            })
            .filter(|(offset, slot)| *offset > 0 || slot.start_minutes > minute_of_day)
            .filter_map(|(offset, slot)| {
                let date = local.date_naive() + Duration::days(i64::from(offset));
                let start = date.and_hms_opt(
                    u32::from(slot.start_minutes / 60),
                    u32::from(slot.start_minutes % 60),
                    0,
                )?;
                local.offset().from_local_datetime(&start).single()
            })
            .map(|at| at.timestamp())
            .min()
    }

    fn slots(&self, day: DayOfWeek) -> Option<&Vec<ScheduleSlot>> {
        self.days.get(&day).filter(|slots| !slots.is_empty())
    }
}

pub fn format_hhmm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_hhmm(raw: &str) -> Option<u16> {
    let (hour, minute) = raw.trim().split_once(':')?;
    let hour: u16 = hour.parse().ok()?;
    let minute: u16 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then_some(hour * 60 + minute)
}

mod hhmm {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(minutes: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hhmm(*minutes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid time of day '{raw}'")))
    }
}
