//! Time-zone application on top of the IANA database shipped in `chrono-tz`.

use core::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

pub const DEFAULT_ZONE: &str = "Europe/Berlin";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZoneError {
    EmptyName,
    UnknownZone,
    TimeOutOfRange,
}

/// Offset and DST rules derived from a zone name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ZoneRules {
    tz: Tz,
}

impl ZoneRules {
    pub fn resolve(name: &str) -> Result<Self, ZoneError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ZoneError::EmptyName);
        }

        Tz::from_str(name)
            .map(|tz| Self { tz })
            .map_err(|_| ZoneError::UnknownZone)
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    pub fn local_time(&self, unix_ms: i64) -> Result<LocalTime, ZoneError> {
        let utc = utc_datetime(unix_ms)?;
        Ok(LocalTime::from_datetime(&utc.with_timezone(&self.tz)))
    }
}

/// Broken-down wall-clock time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LocalTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millis: u16,
}

impl LocalTime {
    /// Best-effort fallback used while no zone is applied.
    pub fn utc(unix_ms: i64) -> Result<Self, ZoneError> {
        Ok(Self::from_datetime(&utc_datetime(unix_ms)?))
    }

    fn from_datetime<Z: TimeZone>(dt: &DateTime<Z>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            // leap-second representation keeps second at 59
            second: dt.second().min(59) as u8,
            millis: (dt.timestamp_subsec_millis() % 1_000) as u16,
        }
    }
}

fn utc_datetime(unix_ms: i64) -> Result<DateTime<Utc>, ZoneError> {
    DateTime::<Utc>::from_timestamp_millis(unix_ms).ok_or(ZoneError::TimeOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-15T12:00:00Z
    const WINTER_NOON_UTC_MS: i64 = 1_705_320_000_000;
    // 2024-07-15T12:00:00Z
    const SUMMER_NOON_UTC_MS: i64 = 1_721_044_800_000;

    #[test]
    fn berlin_resolves() {
        let zone = ZoneRules::resolve("Europe/Berlin").unwrap();
        assert_eq!(zone.name(), "Europe/Berlin");
    }

    #[test]
    fn unknown_and_empty_names_fail() {
        assert_eq!(ZoneRules::resolve("Not/AZone"), Err(ZoneError::UnknownZone));
        assert_eq!(ZoneRules::resolve("   "), Err(ZoneError::EmptyName));
    }

    #[test]
    fn berlin_follows_daylight_saving() {
        let zone = ZoneRules::resolve(DEFAULT_ZONE).unwrap();

        let winter = zone.local_time(WINTER_NOON_UTC_MS).unwrap();
        assert_eq!((winter.hour, winter.minute), (13, 0));

        let summer = zone.local_time(SUMMER_NOON_UTC_MS).unwrap();
        assert_eq!((summer.hour, summer.minute), (14, 0));
        assert_eq!((summer.year, summer.month, summer.day), (2024, 7, 15));
    }

    #[test]
    fn utc_fallback_keeps_millis() {
        let time = LocalTime::utc(WINTER_NOON_UTC_MS + 9_250).unwrap();
        assert_eq!(time.hour, 12);
        assert_eq!(time.second, 9);
        assert_eq!(time.millis, 250);
    }

    #[test]
    fn date_rolls_over_in_zone() {
        let zone = ZoneRules::resolve("America/New_York").unwrap();
        // 2024-01-15T03:00:00Z is still the 14th in New York
        let time = zone.local_time(WINTER_NOON_UTC_MS - 9 * 3_600_000).unwrap();
        assert_eq!((time.day, time.hour), (14, 22));
    }
}
