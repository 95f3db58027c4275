use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Zone the weekly schedule is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimezoneSelector {
    #[default]
    Local,
    Utc,
    Zone(Tz),
}

impl TimezoneSelector {
    /// Unknown identifiers degrade to local time.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Self::Local;
        }
        if trimmed.eq_ignore_ascii_case("utc") {
            return Self::Utc;
        }
        match trimmed.parse::<Tz>() {
            Ok(tz) => Self::Zone(tz),
            Err(_) => {
                debug!("unknown timezone '{trimmed}', using local time");
                Self::Local
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Utc => "UTC",
            Self::Zone(tz) => tz.name(),
        }
    }

    /// Wall-clock view of `now` in this zone.
    pub fn localize(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => {
                let local = now.with_timezone(&Local);
                local.with_timezone(&local.offset().fix())
            }
            Self::Utc => now.with_timezone(&Utc.fix()),
            Self::Zone(tz) => {
                let local = now.with_timezone(tz);
                local.with_timezone(&local.offset().fix())
            }
        }
    }
}

impl From<String> for TimezoneSelector {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TimezoneSelector> for String {
    fn from(value: TimezoneSelector) -> Self {
        value.name().to_string()
    }
}
