//! Nanosecond-precision time primitives used across series, frames, and
//! pipelines.
//!
//! - [`TimeStamp`]: UNIX epoch UTC instant, nanoseconds
//! - [`TimeSpan`]: signed duration, nanoseconds
//! - [`TimeRange`]: half-open interval `[start, end)`
//! - [`Rate`]: sampling frequency in hertz

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A signed, nanosecond-precision duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSpan(i64);

impl TimeSpan {
    /// The zero-length span.
    pub const ZERO: Self = Self(0);
    /// One nanosecond.
    pub const NANOSECOND: Self = Self(1);
    /// One microsecond.
    pub const MICROSECOND: Self = Self(1_000);
    /// One millisecond.
    pub const MILLISECOND: Self = Self(1_000_000);
    /// One second.
    pub const SECOND: Self = Self(1_000_000_000);
    /// One minute.
    pub const MINUTE: Self = Self(60 * 1_000_000_000);
    /// One hour.
    pub const HOUR: Self = Self(3_600 * 1_000_000_000);

    /// Creates a span from a nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the span in nanoseconds.
    pub const fn nanoseconds(self) -> i64 {
        self.0
    }

    /// Returns the span in fractional seconds.
    #[allow(clippy::cast_precision_loss)] // sub-nanosecond precision is irrelevant here
    pub fn seconds(self) -> f64 {
        self.0 as f64 / Self::SECOND.0 as f64
    }

    /// Returns the absolute value of the span, saturating at
    /// `i64::MAX` nanoseconds.
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Converts to a [`Duration`], clamping negative spans to zero.
    #[allow(clippy::cast_sign_loss)] // guarded by the max(0)
    pub fn to_duration(self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64)
    }
}

impl From<Duration> for TimeSpan {
    fn from(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Add for TimeSpan {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for TimeSpan {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<i64> for TimeSpan {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Duration::from_nanos(self.0.unsigned_abs()))?;
        if self.0 < 0 {
            write!(f, " (negative)")?;
        }
        Ok(())
    }
}

/// A nanosecond-precision UNIX epoch UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStamp(i64);

impl TimeStamp {
    /// The UNIX epoch. Also used as the "unset" timestamp.
    pub const ZERO: Self = Self(0);
    /// The largest representable timestamp.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a timestamp from nanoseconds since the epoch.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self(i64::try_from(since_epoch.as_nanos()).unwrap_or(i64::MAX))
    }

    /// Returns nanoseconds since the epoch.
    pub const fn nanoseconds(self) -> i64 {
        self.0
    }

    /// Returns true if the timestamp is the epoch (unset).
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the span elapsed from `earlier` to `self`.
    pub fn span_since(self, earlier: Self) -> TimeSpan {
        TimeSpan(self.0.saturating_sub(earlier.0))
    }
}

impl Add<TimeSpan> for TimeStamp {
    type Output = Self;
    fn add(self, rhs: TimeSpan) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<TimeSpan> for TimeStamp {
    fn add_assign(&mut self, rhs: TimeSpan) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub<TimeSpan> for TimeStamp {
    type Output = Self;
    fn sub(self, rhs: TimeSpan) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A half-open time interval: `start` inclusive, `end` exclusive.
///
/// Series read from a cluster carry a range whose end is one nanosecond past
/// the last sample's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: TimeStamp,
    /// Exclusive end.
    pub end: TimeStamp,
}

impl TimeRange {
    /// Creates a range from its bounds.
    pub const fn new(start: TimeStamp, end: TimeStamp) -> Self {
        Self { start, end }
    }

    /// Returns the span covered by the range.
    pub fn span(&self) -> TimeSpan {
        self.end.span_since(self.start)
    }

    /// Returns true if `ts` is in `[start, end)`.
    pub fn contains(&self, ts: TimeStamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Returns true if `other` lies entirely within this range. Ranges with
    /// identical bounds contain each other.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// A sampling frequency in hertz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(f64);

impl Rate {
    /// Creates a rate from hertz.
    pub const fn hz(value: f64) -> Self {
        Self(value)
    }

    /// Returns the rate in hertz.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns the period between samples at this rate. A non-positive rate
    /// has a zero period.
    #[allow(clippy::cast_possible_truncation)] // periods well under i64::MAX ns
    pub fn period(self) -> TimeSpan {
        if self.0 <= 0.0 {
            return TimeSpan::ZERO;
        }
        TimeSpan((TimeSpan::SECOND.0 as f64 / self.0) as i64)
    }
}

impl From<TimeSpan> for Rate {
    fn from(period: TimeSpan) -> Self {
        let seconds = period.seconds();
        if seconds <= 0.0 {
            return Self(0.0);
        }
        Self(1.0 / seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timespan_conversions() {
        let span = TimeSpan::from(Duration::from_millis(1500));
        assert_eq!(span.nanoseconds(), 1_500_000_000);
        assert!((span.seconds() - 1.5).abs() < f64::EPSILON);
        assert_eq!(span.to_duration(), Duration::from_millis(1500));
        assert_eq!(TimeSpan::from_nanos(-5).to_duration(), Duration::ZERO);
        assert_eq!(TimeSpan::SECOND * 3, TimeSpan::from_nanos(3_000_000_000));
    }

    #[test]
    fn test_extreme_negative_span() {
        let span = TimeSpan::from_nanos(i64::MIN);
        assert_eq!(span.abs(), TimeSpan::from_nanos(i64::MAX));
        let shown = span.to_string();
        assert!(shown.starts_with("9223372036.854775808s"), "{shown}");
        assert!(shown.ends_with("(negative)"));
        assert_eq!(TimeSpan::from_nanos(-1500).to_string(), "1.5µs (negative)");
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let start = TimeStamp::from_nanos(1_000);
        let later = start + TimeSpan::MICROSECOND;
        assert_eq!(later.nanoseconds(), 2_000);
        assert_eq!(later.span_since(start), TimeSpan::MICROSECOND);
        assert_eq!(later - TimeSpan::MICROSECOND, start);
        assert!(TimeStamp::ZERO.is_zero());
        assert!(TimeStamp::now() > TimeStamp::ZERO);
    }

    #[test]
    fn test_time_range_is_half_open() {
        let range = TimeRange::new(TimeStamp::from_nanos(10), TimeStamp::from_nanos(20));
        assert!(range.contains(TimeStamp::from_nanos(10)));
        assert!(range.contains(TimeStamp::from_nanos(19)));
        assert!(!range.contains(TimeStamp::from_nanos(20)));
        assert_eq!(range.span(), TimeSpan::from_nanos(10));

        let inner = TimeRange::new(TimeStamp::from_nanos(12), TimeStamp::from_nanos(20));
        assert!(range.contains_range(&inner));
        assert!(!inner.contains_range(&range));
        assert!(range.contains_range(&range));
    }

    #[test]
    fn test_rate_period() {
        assert_eq!(Rate::hz(1000.0).period(), TimeSpan::MILLISECOND);
        assert_eq!(Rate::hz(0.0).period(), TimeSpan::ZERO);
        let rate = Rate::from(TimeSpan::MILLISECOND * 10);
        assert!((rate.value() - 100.0).abs() < 1e-9);
    }
}
