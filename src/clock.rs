//! Clock sources for time-delta measurement
//!
//! A recorder only needs a monotonically non-decreasing nanosecond reading.
//! Wraparound and frequency scaling are the clock's problem, not the
//! recorder's.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A source of monotonic nanosecond timestamps
pub trait ClockSource: Send + Sync {
    /// Current reading in nanoseconds; never smaller than a previous reading
    fn now_ns(&self) -> u64;
}

impl<T: ClockSource + ?Sized> ClockSource for Arc<T> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// Wall-clock monotonic source
///
/// Uses `CLOCK_MONOTONIC` on Linux and an `Instant`-based fallback elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub const fn new() -> Self {
        Self
    }
}

impl ClockSource for MonotonicClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        #[cfg(target_os = "linux")]
        {
            let mut ts = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC
            // is always available on Linux.
            unsafe {
                libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            }
            (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
        }
        #[cfg(not(target_os = "linux"))]
        {
            use std::time::Instant;
            static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
            let epoch = EPOCH.get_or_init(Instant::now);
            epoch.elapsed().as_nanos() as u64
        }
    }
}

/// Hand-driven clock for deterministic measurements
///
/// # Example
///
/// ```
/// use deltatrace::clock::{ClockSource, ManualClock};
///
/// let clock = ManualClock::new(100);
/// clock.advance(50);
/// assert_eq!(clock.now_ns(), 150);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub const fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// Move the clock forward by `delta_ns`
    pub fn advance(&self, delta_ns: u64) {
        self.now.fetch_add(delta_ns, Ordering::Relaxed);
    }

    /// Jump to `now_ns`; earlier values are ignored to keep the clock monotonic
    pub fn set(&self, now_ns: u64) {
        self.now.fetch_max(now_ns, Ordering::Relaxed);
    }
}

impl ClockSource for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
