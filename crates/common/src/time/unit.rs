//! Time unit conversions
//!
//! `TimeUnit` converts between nanoseconds, microseconds, milliseconds,
//! seconds, minutes, hours and days. Conversions to coarser units truncate
//! toward zero; conversions that overflow saturate at `i64::MIN`/`i64::MAX`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

const NANOS_PER_MICRO: i128 = 1_000;
const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_MINUTE: i128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i128 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i128 = 24 * NANOS_PER_HOUR;

/// A unit of time granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Every unit, finest first
    pub const ALL: [Self; 7] = [
        Self::Nanoseconds,
        Self::Microseconds,
        Self::Milliseconds,
        Self::Seconds,
        Self::Minutes,
        Self::Hours,
        Self::Days,
    ];

    const fn nanos_per_unit(self) -> i128 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => NANOS_PER_MICRO,
            Self::Milliseconds => NANOS_PER_MILLI,
            Self::Seconds => NANOS_PER_SECOND,
            Self::Minutes => NANOS_PER_MINUTE,
            Self::Hours => NANOS_PER_HOUR,
            Self::Days => NANOS_PER_DAY,
        }
    }

    /// Convert `amount` expressed in `source` into this unit
    ///
    /// ```
    /// use cadence_common::time::TimeUnit;
    ///
    /// assert_eq!(TimeUnit::Milliseconds.convert(3, TimeUnit::Seconds), 3_000);
    /// assert_eq!(TimeUnit::Minutes.convert(119, TimeUnit::Seconds), 1);
    /// ```
    pub fn convert(self, amount: i64, source: TimeUnit) -> i64 {
        self.from_nanos_i128(i128::from(amount) * source.nanos_per_unit())
    }

    /// Express a signed nanosecond count in this unit
    pub fn from_nanos_i128(self, nanos: i128) -> i64 {
        saturate(nanos / self.nanos_per_unit())
    }

    /// Express a duration in this unit
    pub fn from_duration(self, duration: Duration) -> i64 {
        let nanos = i128::try_from(duration.as_nanos()).unwrap_or(i128::MAX);
        self.from_nanos_i128(nanos)
    }

    /// Build a duration from `amount` of this unit
    ///
    /// Negative amounts clamp to `Duration::ZERO`; amounts beyond the range
    /// of `Duration` saturate at `Duration::MAX`.
    pub fn to_duration(self, amount: i64) -> Duration {
        if amount <= 0 {
            return Duration::ZERO;
        }
        let nanos = i128::from(amount) * self.nanos_per_unit();
        let secs = nanos / NANOS_PER_SECOND;
        let subsec = (nanos % NANOS_PER_SECOND) as u32;
        match u64::try_from(secs) {
            Ok(secs) => Duration::new(secs, subsec),
            Err(_) => Duration::MAX,
        }
    }

    pub fn to_nanos(self, amount: i64) -> i64 {
        Self::Nanoseconds.convert(amount, self)
    }

    pub fn to_micros(self, amount: i64) -> i64 {
        Self::Microseconds.convert(amount, self)
    }

    pub fn to_millis(self, amount: i64) -> i64 {
        Self::Milliseconds.convert(amount, self)
    }

    pub fn to_seconds(self, amount: i64) -> i64 {
        Self::Seconds.convert(amount, self)
    }

    pub fn to_minutes(self, amount: i64) -> i64 {
        Self::Minutes.convert(amount, self)
    }

    pub fn to_hours(self, amount: i64) -> i64 {
        Self::Hours.convert(amount, self)
    }

    pub fn to_days(self, amount: i64) -> i64 {
        Self::Days.convert(amount, self)
    }

    /// Short suffix used when formatting amounts (`ns`, `ms`, `h`, ...)
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
            Self::Days => "d",
        }
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        };
        f.write_str(name)
    }
}

impl FromStr for TimeUnit {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|unit| unit.to_string() == normalized || unit.suffix() == normalized)
            .ok_or_else(|| CommonError::validation_with_value("time_unit", "unknown time unit", s))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for time::unit.
    use super::*;

    /// Validates conversions toward coarser units truncate toward zero.
    ///
    /// Assertions:
    /// - Confirms `TimeUnit::Seconds.convert(1_999, Milliseconds)` equals `1`.
    /// - Confirms negative amounts truncate toward zero as well.
    #[test]
    fn test_convert_truncates_toward_zero() {
        assert_eq!(TimeUnit::Seconds.convert(1_999, TimeUnit::Milliseconds), 1);
        assert_eq!(TimeUnit::Seconds.convert(-1_999, TimeUnit::Milliseconds), -1);
        assert_eq!(TimeUnit::Days.convert(47, TimeUnit::Hours), 1);
    }

    /// Validates conversions toward finer units.
    #[test]
    fn test_convert_to_finer_units() {
        assert_eq!(TimeUnit::Days.to_hours(2), 48);
        assert_eq!(TimeUnit::Hours.to_minutes(1), 60);
        assert_eq!(TimeUnit::Minutes.to_seconds(3), 180);
        assert_eq!(TimeUnit::Seconds.to_millis(2), 2_000);
        assert_eq!(TimeUnit::Milliseconds.to_micros(5), 5_000);
        assert_eq!(TimeUnit::Microseconds.to_nanos(7), 7_000);
        assert_eq!(TimeUnit::Nanoseconds.to_days(NANOS_PER_DAY as i64), 1);
    }

    /// Validates overflowing conversions saturate instead of wrapping.
    #[test]
    fn test_convert_saturates() {
        assert_eq!(TimeUnit::Days.to_nanos(i64::MAX), i64::MAX);
        assert_eq!(TimeUnit::Days.to_nanos(i64::MIN), i64::MIN);
    }

    /// Validates `to_duration` clamps negatives and keeps sub-second parts.
    #[test]
    fn test_to_duration() {
        assert_eq!(TimeUnit::Seconds.to_duration(-3), Duration::ZERO);
        assert_eq!(TimeUnit::Milliseconds.to_duration(1_500), Duration::from_millis(1_500));
        assert_eq!(TimeUnit::Days.to_duration(1), Duration::from_secs(86_400));
        assert_eq!(TimeUnit::Nanoseconds.to_duration(1), Duration::from_nanos(1));
    }

    /// Validates `from_duration` in every unit.
    #[test]
    fn test_from_duration() {
        let duration = Duration::from_secs(90);
        assert_eq!(TimeUnit::Minutes.from_duration(duration), 1);
        assert_eq!(TimeUnit::Seconds.from_duration(duration), 90);
        assert_eq!(TimeUnit::Milliseconds.from_duration(duration), 90_000);
        assert_eq!(TimeUnit::Nanoseconds.from_duration(Duration::MAX), i64::MAX);
    }

    /// Validates parsing by full name and by suffix.
    #[test]
    fn test_from_str() {
        assert_eq!("seconds".parse::<TimeUnit>().ok(), Some(TimeUnit::Seconds));
        assert_eq!("MS".parse::<TimeUnit>().ok(), Some(TimeUnit::Milliseconds));
        assert_eq!(" d ".parse::<TimeUnit>().ok(), Some(TimeUnit::Days));
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }
}
