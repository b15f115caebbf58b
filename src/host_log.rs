//! Logging channel for the subsystem being measured
//!
//! Host code logs through a [`HostLog`] handle instead of calling its
//! logging facility directly. While instrumentation is active (and the
//! policy asks for it) the handle is quiet, so log formatting and I/O don't
//! land inside the measured regions. The [`host_log!`](crate::host_log!)
//! macro keeps the format arguments type-checked either way, but only
//! evaluates them when the handle is live.

use crate::config::ReportingPolicy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-subsystem logging handle
#[derive(Debug)]
pub struct HostLog {
    subsystem: &'static str,
    live: bool,
    emitted: AtomicU64,
    suppressed: AtomicU64,
}

impl HostLog {
    /// Handle that is quiet whenever `policy` silences host logging
    pub fn new(subsystem: &'static str, policy: &ReportingPolicy) -> Self {
        Self::with_state(subsystem, !policy.silences_host_logging())
    }

    pub fn live(subsystem: &'static str) -> Self {
        Self::with_state(subsystem, true)
    }

    pub fn quiet(subsystem: &'static str) -> Self {
        Self::with_state(subsystem, false)
    }

    fn with_state(subsystem: &'static str, live: bool) -> Self {
        Self {
            subsystem,
            live,
            emitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn subsystem(&self) -> &'static str {
        self.subsystem
    }

    #[inline(always)]
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Write one message; ignored on a quiet handle
    pub fn log(&self, args: fmt::Arguments<'_>) {
        if !self.live {
            self.note_suppressed();
            return;
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "host", subsystem = self.subsystem, "{}", args);
    }

    #[inline]
    pub fn note_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// Log through a [`HostLog`](crate::host_log::HostLog) handle
///
/// ```
/// use deltatrace::host_log;
/// use deltatrace::host_log::HostLog;
///
/// let log = HostLog::quiet("dispatch");
/// let queue_len = 3;
/// host_log!(log, "queue length {}", queue_len);
/// assert_eq!(log.suppressed_count(), 1);
/// ```
#[macro_export]
macro_rules! host_log {
    ($log:expr, $($arg:tt)+) => {{
        let log: &$crate::host_log::HostLog = &$log;
        if log.is_live() {
            log.log(format_args!($($arg)+));
        } else {
            log.note_suppressed();
        }
    }};
}
