//! Outcome of a schedule request.

use std::fmt;
use std::time::Duration;

/// The delay until a task may run.
///
/// A non-positive delay is a grant; `Ready` carries the capacity that was
/// still spare after the slice was committed. A positive delay is a denial;
/// `Wait` carries how long the caller must wait before the same request
/// would be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delay {
    /// Granted, with this much spare capacity left in the window
    Ready(Duration),
    /// Denied, grantable again after this long
    Wait(Duration),
}

impl Delay {
    /// Build a delay from signed nanoseconds.
    pub fn from_nanos(nanos: i64) -> Self {
        if nanos <= 0 {
            Delay::Ready(Duration::from_nanos(nanos.unsigned_abs()))
        } else {
            Delay::Wait(Duration::from_nanos(nanos as u64))
        }
    }

    /// The delay as signed nanoseconds; zero or negative means granted.
    pub fn as_nanos(&self) -> i64 {
        match self {
            Delay::Ready(spare) => -(i64::try_from(spare.as_nanos()).unwrap_or(i64::MAX)),
            Delay::Wait(wait) => i64::try_from(wait.as_nanos()).unwrap_or(i64::MAX),
        }
    }

    /// Whether the task may run now.
    pub fn is_granted(&self) -> bool {
        matches!(self, Delay::Ready(_))
    }

    /// How long to wait before retrying. Zero when granted.
    pub fn wait(&self) -> Duration {
        match self {
            Delay::Ready(_) => Duration::ZERO,
            Delay::Wait(wait) => *wait,
        }
    }

    /// Capacity left after a grant. Zero when denied.
    pub fn spare(&self) -> Duration {
        match self {
            Delay::Ready(spare) => *spare,
            Delay::Wait(_) => Duration::ZERO,
        }
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Ready(spare) if spare.is_zero() => write!(f, "0s"),
            Delay::Ready(spare) => write!(f, "-{:?}", spare),
            Delay::Wait(wait) => write!(f, "{:?}", wait),
        }
    }
}
