//! Process-wide instrumentation context
//!
//! Bundles the reporting policy with the clock and sink recorders use.
//! `time_deltas_init!` reads the installed context; install one early in
//! `main` to pick the sink and policy, or leave it alone to get
//! [`MonotonicClock`], [`TracingSink`], and the default policy.

use crate::clock::{ClockSource, MonotonicClock};
use crate::config::ReportingPolicy;
use crate::host_log::HostLog;
use crate::trace_sink::{TraceSink, TracingSink};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors from installing the global context
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InstallError {
    #[error("Instrumentation context already installed or already in use")]
    AlreadyInstalled,
}

/// Policy, clock, and sink shared by recorders
pub struct Instrumentation {
    policy: ReportingPolicy,
    clock: Box<dyn ClockSource>,
    sink: Box<dyn TraceSink>,
}

impl Instrumentation {
    pub fn new(
        policy: ReportingPolicy,
        clock: impl ClockSource + 'static,
        sink: impl TraceSink + 'static,
    ) -> Self {
        Self {
            policy,
            clock: Box::new(clock),
            sink: Box::new(sink),
        }
    }

    /// Context whose recorders are all inert
    pub fn disabled() -> Self {
        Self::new(ReportingPolicy::disabled(), MonotonicClock, TracingSink)
    }

    pub fn policy(&self) -> ReportingPolicy {
        self.policy
    }

    pub fn clock(&self) -> &dyn ClockSource {
        &*self.clock
    }

    pub fn sink(&self) -> &dyn TraceSink {
        &*self.sink
    }

    /// Logging handle for a host subsystem, muted while this context measures
    pub fn host_log(&self, subsystem: &'static str) -> HostLog {
        HostLog::new(subsystem, &self.policy)
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new(ReportingPolicy::default(), MonotonicClock, TracingSink)
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

static INSTALLED: OnceLock<Instrumentation> = OnceLock::new();

/// Install the process-wide context
///
/// Fails if a context was installed before, or if [`current`] already fell
/// back to the default.
pub fn install(instrumentation: Instrumentation) -> Result<(), InstallError> {
    INSTALLED
        .set(instrumentation)
        .map_err(|_| InstallError::AlreadyInstalled)?;
    tracing::debug!(policy = ?current().policy(), "instrumentation context installed");
    Ok(())
}

/// The installed context, or the default one
pub fn current() -> &'static Instrumentation {
    INSTALLED.get_or_init(Instrumentation::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::trace_sink::{MemorySink, Metric, TraceRecord};

    #[test]
    fn test_default_context_uses_default_policy() {
        let ctx = Instrumentation::default();
        assert_eq!(ctx.policy(), ReportingPolicy::default());
    }

    #[test]
    fn test_context_exposes_collaborators() {
        let ctx = Instrumentation::new(
            ReportingPolicy::new(),
            ManualClock::new(77),
            MemorySink::new(),
        );
        assert_eq!(ctx.clock().now_ns(), 77);
        ctx.sink()
            .emit(&TraceRecord::new("a.rs", 1, "x", Metric::Imbalance));
    }

    #[test]
    fn test_disabled_context_keeps_host_logging() {
        let ctx = Instrumentation::disabled();
        assert!(!ctx.policy().is_active());
        assert!(ctx.host_log("sched").is_live());
    }

    #[test]
    fn test_debug_does_not_expose_trait_objects() {
        let text = format!("{:?}", Instrumentation::default());
        assert!(text.starts_with("Instrumentation"));
        assert!(text.contains("policy"));
    }
}
