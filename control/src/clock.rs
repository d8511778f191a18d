use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt;

/// India Standard Time, +5:30.
pub const DEFAULT_UTC_OFFSET_SECS: i64 = 19800;

/// Wall-clock source. `epoch_time` already includes the configured offset,
/// so the calendar fields are read from it as if it were UTC.
pub trait ClockSource {
    /// Refreshes the clock if it needs it. Returns false when the refresh
    /// failed; the clock then keeps serving its last known value.
    fn update(&mut self) -> bool;

    /// Seconds since the Unix epoch, shifted by the UTC offset.
    fn epoch_time(&self) -> i64;

    fn hours(&self) -> u32 {
        (self.epoch_time().rem_euclid(86400) / 3600) as u32
    }

    fn minutes(&self) -> u32 {
        (self.epoch_time().rem_euclid(3600) / 60) as u32
    }

    fn timestamp(&self) -> Timestamp {
        Timestamp::from_epoch(self.epoch_time())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub hour: u32,
    pub minute: u32,
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl Timestamp {
    /// Out-of-range epochs collapse to the epoch itself.
    pub fn from_epoch(epoch: i64) -> Timestamp {
        let dt = DateTime::<Utc>::from_timestamp(epoch, 0).unwrap_or_default();
        Timestamp {
            hour: dt.hour(),
            minute: dt.minute(),
            day: dt.day(),
            month: dt.month(),
            year: dt.year(),
        }
    }
}

/// Unpadded `H:M D-M-YYYY`, e.g. `10:0 1-1-2024`.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}-{}-{}",
            self.hour, self.minute, self.day, self.month, self.year
        )
    }
}

/// Host clock, assumed to be disciplined by the OS (NTP, RTC).
pub struct SystemClock {
    offset_secs: i64,
}

impl SystemClock {
    pub fn new(offset_secs: i64) -> Self {
        SystemClock { offset_secs }
    }
}

impl ClockSource for SystemClock {
    fn update(&mut self) -> bool {
        true
    }

    fn epoch_time(&self) -> i64 {
        Utc::now().timestamp() + self.offset_secs
    }
}
