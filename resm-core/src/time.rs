//! Model time values.
//!
//! A state's time is either a calendar instant or an elapsed duration since
//! an arbitrary origin. Only addition of a timestep, subtraction and
//! comparison are needed; calendar rules are left to `chrono`.

use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTime {
    Instant(NaiveDateTime),
    Elapsed(Duration),
}

impl ModelTime {
    /// Elapsed time of `seconds` whole seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        ModelTime::Elapsed(Duration::seconds(seconds))
    }

    /// Time between `earlier` and `self`, if both are of the same kind.
    pub fn since(&self, earlier: &ModelTime) -> Option<Duration> {
        match (self, earlier) {
            (ModelTime::Instant(a), ModelTime::Instant(b)) => Some(*a - *b),
            (ModelTime::Elapsed(a), ModelTime::Elapsed(b)) => Some(*a - *b),
            _ => None,
        }
    }
}

impl Add<Duration> for ModelTime {
    type Output = ModelTime;

    fn add(self, rhs: Duration) -> ModelTime {
        match self {
            ModelTime::Instant(t) => ModelTime::Instant(t + rhs),
            ModelTime::Elapsed(d) => ModelTime::Elapsed(d + rhs),
        }
    }
}

impl PartialOrd for ModelTime {
    /// Instants and elapsed times are not comparable with each other.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ModelTime::Instant(a), ModelTime::Instant(b)) => a.partial_cmp(b),
            (ModelTime::Elapsed(a), ModelTime::Elapsed(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<NaiveDateTime> for ModelTime {
    fn from(t: NaiveDateTime) -> Self {
        ModelTime::Instant(t)
    }
}

impl From<Duration> for ModelTime {
    fn from(d: Duration) -> Self {
        ModelTime::Elapsed(d)
    }
}

impl fmt::Display for ModelTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTime::Instant(t) => write!(f, "{t}"),
            ModelTime::Elapsed(d) => write!(f, "{}s", seconds(d)),
        }
    }
}

/// A duration in (fractional) seconds.
pub fn seconds(duration: &Duration) -> f64 {
    duration.num_seconds() as f64 + f64::from(duration.subsec_nanos()) / 1e9
}
