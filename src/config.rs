//! Reporting policy and configuration loading
//!
//! The policy is chosen before measurement starts and copied into every
//! recorder; nothing mutates it on a live recorder.
//!
//! ```toml
//! ring_capacity = 8192
//!
//! [reporting]
//! instrumentation_enabled = true
//! print_durations = true
//! print_totals_and_calls = true
//! overflow = "warn-on-stop"
//! quiet_host_logging = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// What happens when a recorder runs past its capacity
///
/// Starts past capacity are always silent no-ops; the policies differ only
/// in what an overflowing stop reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Every overflowing stop emits a capacity warning
    #[default]
    WarnOnStop,
    /// Only the first overflowing stop of a session warns
    WarnOnce,
    /// Overflow is never reported
    Silent,
}

/// Which records a recorder emits, and whether it records at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingPolicy {
    /// Master switch; off turns every recorder operation into a no-op
    pub instrumentation_enabled: bool,
    /// Emit a `t_delta` record per completed region
    pub print_durations: bool,
    /// Emit a `t_tot`/`calls` record per completed region
    pub print_totals_and_calls: bool,
    pub overflow: OverflowPolicy,
    /// Silence the measured subsystem's own logging while instrumentation is
    /// active
    pub quiet_host_logging: bool,
}

impl ReportingPolicy {
    /// Everything on, warnings on every overflowing stop
    pub const fn new() -> Self {
        Self {
            instrumentation_enabled: true,
            print_durations: true,
            print_totals_and_calls: true,
            overflow: OverflowPolicy::WarnOnStop,
            quiet_host_logging: true,
        }
    }

    /// Policy under which recorders never touch the clock, sink, or registry
    pub const fn disabled() -> Self {
        Self {
            instrumentation_enabled: false,
            ..Self::new()
        }
    }

    pub const fn with_durations(mut self, on: bool) -> Self {
        self.print_durations = on;
        self
    }

    pub const fn with_totals_and_calls(mut self, on: bool) -> Self {
        self.print_totals_and_calls = on;
        self
    }

    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub const fn with_quiet_host_logging(mut self, on: bool) -> Self {
        self.quiet_host_logging = on;
        self
    }

    /// True when recorders built from this policy do real work
    ///
    /// Always false when the crate is built without the `time-deltas`
    /// feature.
    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        crate::ENABLED && self.instrumentation_enabled
    }

    /// True when host logging should be muted
    pub const fn silences_host_logging(&self) -> bool {
        self.is_active() && self.quiet_host_logging
    }
}

impl Default for ReportingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaTraceConfig {
    pub reporting: ReportingPolicy,
    /// Records kept by the ring buffer sink
    pub ring_capacity: usize,
}

impl Default for DeltaTraceConfig {
    fn default() -> Self {
        Self {
            reporting: ReportingPolicy::default(),
            ring_capacity: crate::ring_buffer::DEFAULT_CAPACITY,
        }
    }
}

impl DeltaTraceConfig {
    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded deltatrace config");
        Ok(config)
    }

    /// Parse and validate TOML text; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(ConfigError::Invalid(
                "ring_capacity must be > 0".to_string(),
            ));
        }

        let reporting = &self.reporting;
        if reporting.instrumentation_enabled
            && !reporting.print_durations
            && !reporting.print_totals_and_calls
        {
            tracing::warn!(
                "instrumentation enabled with both print_durations and \
                 print_totals_and_calls off; only warnings will be traced"
            );
        }

        Ok(())
    }
}
