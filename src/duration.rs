//! Mixed-unit durations.
//!
//! A [`Duration`] is a plain value made of day, hour, minute, second,
//! millisecond and microsecond magnitudes. It never normalizes its parts:
//! `Duration { minutes: 90.0, ..Default::default() }` stays 90 minutes and
//! reports `in_hours() == 1.5`.
//!
//! Magnitudes are `f64`, so fractional and negative values are accepted. A
//! negative total describes an interval that has already elapsed, which is
//! how an already-expired TTL is expressed.
//!
//! ```
//! use persistor::Duration;
//!
//! let ttl = Duration { minutes: 1.0, seconds: 30.0, ..Default::default() };
//! assert_eq!(ttl.in_seconds(), 90.0);
//! assert!(!ttl.is_negative());
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg};

const HOURS_PER_DAY: f64 = 24.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const SECONDS_PER_MINUTE: f64 = 60.0;
const MILLIS_PER_SECOND: f64 = 1000.0;
const MICROS_PER_MILLI: f64 = 1000.0;

const MILLIS_PER_MINUTE: f64 = SECONDS_PER_MINUTE * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: f64 = MINUTES_PER_HOUR * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: f64 = HOURS_PER_DAY * MILLIS_PER_HOUR;

/// A length of time expressed in mixed units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Duration {
    #[serde(skip_serializing_if = "is_zero")]
    pub days: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub hours: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub minutes: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub seconds: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub milliseconds: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub microseconds: f64,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde passes fields by reference
fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

impl Duration {
    /// The empty duration.
    pub const ZERO: Self = Self {
        days: 0.0,
        hours: 0.0,
        minutes: 0.0,
        seconds: 0.0,
        milliseconds: 0.0,
        microseconds: 0.0,
    };
    /// A non-leap year, 365 days.
    pub const YEAR: Self = Self::days(365.0);
    /// A commercial month, 30 days.
    pub const MONTH: Self = Self::days(30.0);
    pub const DAY: Self = Self::days(1.0);
    pub const HOUR: Self = Self::hours(1.0);
    pub const MINUTE: Self = Self::minutes(1.0);
    pub const SECOND: Self = Self::seconds(1.0);
    pub const MILLISECOND: Self = Self::milliseconds(1.0);
    pub const MICROSECOND: Self = Self::microseconds(1.0);

    pub const fn days(days: f64) -> Self {
        Self { days, ..Self::ZERO }
    }

    pub const fn hours(hours: f64) -> Self {
        Self { hours, ..Self::ZERO }
    }

    pub const fn minutes(minutes: f64) -> Self {
        Self { minutes, ..Self::ZERO }
    }

    pub const fn seconds(seconds: f64) -> Self {
        Self { seconds, ..Self::ZERO }
    }

    pub const fn milliseconds(milliseconds: f64) -> Self {
        Self {
            milliseconds,
            ..Self::ZERO
        }
    }

    pub const fn microseconds(microseconds: f64) -> Self {
        Self {
            microseconds,
            ..Self::ZERO
        }
    }

    /// Signed span from `since` to `until`.
    ///
    /// Negative when `until` precedes `since`, so
    /// `Duration::between(expire_at, now).is_negative()` reads as "expired".
    pub fn between(until: DateTime<Utc>, since: DateTime<Utc>) -> Self {
        let delta = until - since;
        match delta.num_microseconds() {
            Some(micros) => Self::microseconds(micros as f64),
            None => Self::milliseconds(delta.num_milliseconds() as f64),
        }
    }

    /// Total length in milliseconds. Every other unit derives from this.
    pub fn in_milliseconds(&self) -> f64 {
        self.days * MILLIS_PER_DAY
            + self.hours * MILLIS_PER_HOUR
            + self.minutes * MILLIS_PER_MINUTE
            + self.seconds * MILLIS_PER_SECOND
            + self.milliseconds
            + self.microseconds / MICROS_PER_MILLI
    }

    pub fn in_microseconds(&self) -> f64 {
        self.in_milliseconds() * MICROS_PER_MILLI
    }

    pub fn in_seconds(&self) -> f64 {
        self.in_milliseconds() / MILLIS_PER_SECOND
    }

    pub fn in_minutes(&self) -> f64 {
        self.in_milliseconds() / MILLIS_PER_MINUTE
    }

    pub fn in_hours(&self) -> f64 {
        self.in_milliseconds() / MILLIS_PER_HOUR
    }

    pub fn in_days(&self) -> f64 {
        self.in_milliseconds() / MILLIS_PER_DAY
    }

    pub fn is_negative(&self) -> bool {
        self.in_milliseconds() < 0.0
    }

    pub fn is_zero(&self) -> bool {
        self.in_milliseconds() == 0.0
    }

    /// Converts to a chrono delta, truncating below one microsecond.
    ///
    /// Values beyond what `TimeDelta` can hold saturate at its bounds.
    pub fn to_time_delta(&self) -> TimeDelta {
        let micros = self.in_microseconds();
        if micros >= TimeDelta::MAX.num_milliseconds() as f64 * MICROS_PER_MILLI {
            TimeDelta::MAX
        } else if micros <= TimeDelta::MIN.num_milliseconds() as f64 * MICROS_PER_MILLI {
            TimeDelta::MIN
        } else {
            // `as` saturates and maps NaN to zero.
            TimeDelta::microseconds(micros as i64)
        }
    }

    /// Absolute instant at which something living for `self` expires.
    ///
    /// A zero duration means "never expires" and returns `None`, as does an
    /// instant too far in the future to represent. Instants too far in the
    /// past clamp to the earliest representable time.
    pub fn expire_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_zero() || self.in_milliseconds().is_nan() {
            return None;
        }
        match now.checked_add_signed(self.to_time_delta()) {
            Some(instant) => Some(instant),
            None if self.is_negative() => Some(DateTime::<Utc>::MIN_UTC),
            None => None,
        }
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            days: self.days + rhs.days,
            hours: self.hours + rhs.hours,
            minutes: self.minutes + rhs.minutes,
            seconds: self.seconds + rhs.seconds,
            milliseconds: self.milliseconds + rhs.milliseconds,
            microseconds: self.microseconds + rhs.microseconds,
        }
    }
}

impl Neg for Duration {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            days: -self.days,
            hours: -self.hours,
            minutes: -self.minutes,
            seconds: -self.seconds,
            milliseconds: -self.milliseconds,
            microseconds: -self.microseconds,
        }
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self::microseconds(value.as_micros() as f64)
    }
}
