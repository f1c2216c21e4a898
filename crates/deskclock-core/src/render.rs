//! Display view models.

use core::fmt::{self, Write};

use heapless::String;

use crate::zone::LocalTime;

pub const DISPLAY_WIDTH: i32 = 128;
pub const DISPLAY_HEIGHT: i32 = 64;
/// Width of the seconds marker bar in pixels.
pub const SECOND_MARKER_WIDTH: u32 = 10;

pub const DISCONNECTED_LABEL: &str = "<disconnected>";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetworkLabel {
    Address([u8; 4]),
    Disconnected,
}

impl NetworkLabel {
    pub fn text(&self) -> String<16> {
        let mut out = String::new();
        let _ = write!(out, "{}", self);
        out
    }
}

impl fmt::Display for NetworkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address([a, b, c, d]) => write!(f, "{}.{}.{}.{}", a, b, c, d),
            Self::Disconnected => f.write_str(DISCONNECTED_LABEL),
        }
    }
}

/// Everything the clock screen shows. `time` is `None` before network time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClockFace {
    pub time: Option<LocalTime>,
    pub network: NetworkLabel,
}

impl ClockFace {
    pub fn time_text(&self) -> String<5> {
        let mut out = String::new();
        match self.time {
            Some(time) => {
                let _ = write!(out, "{:02}:{:02}", time.hour, time.minute);
            }
            None => {
                let _ = out.push_str("--:--");
            }
        }
        out
    }

    pub fn date_text(&self) -> String<10> {
        let mut out = String::new();
        match self.time {
            Some(time) => {
                let _ = write!(
                    out,
                    "{:02}.{:02}.{:04}",
                    time.day,
                    time.month,
                    time.year.clamp(0, 9999)
                );
            }
            None => {
                let _ = out.push_str("--.--.----");
            }
        }
        out
    }

    /// Left edge of the seconds bar; the bar sweeps the width once a minute.
    pub fn second_marker_x(&self) -> Option<i32> {
        let time = self.time?;
        let millis_into_minute = time.second as i32 * 1_000 + time.millis as i32;
        let centre = DISPLAY_WIDTH * millis_into_minute / (59 * 1_000);
        Some(centre - SECOND_MARKER_WIDTH as i32 / 2)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Screen {
    Boot,
    WifiFailed { code: u8, reason: &'static str },
    Clock(ClockFace),
}
