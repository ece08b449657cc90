use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Absolute time in nanoseconds on a wrapping 64-bit counter.
///
/// Differences between two `CobaltTime`s are computed with wrapping subtraction and
/// read back as signed, so ordering stays meaningful across a counter wrap as long as
/// the two points are less than 2^63 ns apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CobaltTime(u64);

impl CobaltTime {
    pub const ZERO: CobaltTime = CobaltTime(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Unsigned distance from `earlier` to `self`, wrapping.
    pub const fn elapsed_since(&self, earlier: CobaltTime) -> u64 {
        self.0.wrapping_sub(earlier.0)
    }

    pub const fn wrapping_add_nanos(&self, nanos: u64) -> Self {
        Self(self.0.wrapping_add(nanos))
    }
}

impl Add<Duration> for CobaltTime {
    type Output = CobaltTime;

    fn add(self, rhs: Duration) -> Self::Output {
        self.wrapping_add_nanos(duration_to_nanos(rhs))
    }
}

impl Sub for CobaltTime {
    type Output = i64;

    fn sub(self, rhs: CobaltTime) -> Self::Output {
        self.0.wrapping_sub(rhs.0) as i64
    }
}

impl fmt::Display for CobaltTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Saturates at `u64::MAX` nanoseconds (about 584 years).
pub fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

pub trait Clock: Send {
    fn now(&self) -> CobaltTime;
}

/// Monotonic clock counting from the moment it was created.
///
/// Backed by `tokio::time::Instant`, so it follows a paused tokio clock in tests.
#[derive(Debug, Clone)]
pub struct InstantClock {
    base: Instant,
}

impl InstantClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for InstantClock {
    fn now(&self) -> CobaltTime {
        CobaltTime::from_nanos(duration_to_nanos(self.base.elapsed()))
    }
}

/// A clock that only moves when told to. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: CobaltTime) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.as_nanos())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let nanos = duration_to_nanos(duration);
        // fetch_add wraps on overflow, same as CobaltTime arithmetic
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn set(&self, time: CobaltTime) {
        self.nanos.store(time.as_nanos(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> CobaltTime {
        CobaltTime::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}
