//! Trace records and the sinks that receive them
//!
//! Every measurement, total, and warning leaves the recorder as a
//! [`TraceRecord`]. Records are `Copy` and borrow only `'static` data, so
//! building one never allocates. Sinks are fire-and-forget: a sink may drop
//! records (ring overwrite, closed stderr) and the recorder never finds out.
//!
//! The text rendering keeps the column layout of the kernel `trace_printk`
//! output the summary tooling was written against:
//!
//! ```text
//!            src/dispatch.rs +  42 pick_next                                  t_delta:       812 ns
//!            src/dispatch.rs +  42 pick_next                                    t_tot:     91532 ns,   calls:       113
//! ```

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Message carried by start/stop ordering warnings
pub const IMBALANCE_MESSAGE: &str = "WARNING unbalanced record_start/record_stop";

/// Message carried by capacity overflow warnings
pub const OVERFLOW_MESSAGE: &str = "WARNING array index out of bounds!";

/// What a record reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Duration of one start/stop pair
    Duration { delta_ns: u64 },
    /// Cumulative duration and start count for the slot
    TotalAndCalls { total_ns: u64, calls: u64 },
    /// A start or stop arrived out of order
    Imbalance,
    /// A stop ran past the recorder capacity; `required` is the capacity
    /// that would have fit it
    CapacityOverflow { capacity: usize, required: usize },
}

impl Metric {
    /// Short tag used in the rendered line
    pub fn tag(&self) -> &'static str {
        match self {
            Metric::Duration { .. } => "t_delta",
            Metric::TotalAndCalls { .. } => "t_tot",
            Metric::Imbalance | Metric::CapacityOverflow { .. } => "WARNING",
        }
    }

    /// Primary numeric value, if any
    pub fn value(&self) -> Option<u64> {
        match *self {
            Metric::Duration { delta_ns } => Some(delta_ns),
            Metric::TotalAndCalls { total_ns, .. } => Some(total_ns),
            Metric::Imbalance => None,
            Metric::CapacityOverflow { required, .. } => Some(required as u64),
        }
    }

    /// Unit of [`Metric::value`]
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Metric::Duration { .. } | Metric::TotalAndCalls { .. } => Some("ns"),
            Metric::CapacityOverflow { .. } => Some("slots"),
            Metric::Imbalance => None,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Metric::Imbalance | Metric::CapacityOverflow { .. })
    }
}

/// One diagnostic line produced by a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    /// Source file of the start/stop call
    pub file: &'static str,
    /// Source line of the start/stop call
    pub line: u32,
    /// Region label; empty for records raised by a start
    pub label: &'static str,
    pub metric: Metric,
}

impl TraceRecord {
    pub fn new(file: &'static str, line: u32, label: &'static str, metric: Metric) -> Self {
        Self {
            file,
            line,
            label,
            metric,
        }
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>27} +{:>4} ", self.file, self.line)?;
        match self.metric {
            Metric::Duration { delta_ns } => write!(
                f,
                "{:<42} {:>8} {:>9} {:>2}",
                self.label, "t_delta:", delta_ns, "ns"
            ),
            Metric::TotalAndCalls { total_ns, calls } => write!(
                f,
                "{:<42} {:>8} {:>9} {:>2}, {:>8} {:>9}",
                self.label, "t_tot:", total_ns, "ns", "calls:", calls
            ),
            Metric::Imbalance => write!(f, "{}", IMBALANCE_MESSAGE),
            Metric::CapacityOverflow { capacity, required } => write!(
                f,
                "{:<42} {:>8} time_deltas_init!({})  {:>8} (capacity {})",
                OVERFLOW_MESSAGE, "set:", required, "please!", capacity
            ),
        }
    }
}

/// Destination for trace records
///
/// Implementations must not block for long and must swallow their own I/O
/// failures.
pub trait TraceSink: Send + Sync {
    fn emit(&self, record: &TraceRecord);
}

impl<T: TraceSink + ?Sized> TraceSink for Arc<T> {
    fn emit(&self, record: &TraceRecord) {
        (**self).emit(record)
    }
}

/// Writes rendered records to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl TraceSink for StderrSink {
    fn emit(&self, record: &TraceRecord) {
        let _ = writeln!(std::io::stderr().lock(), "{}", record);
    }
}

/// Forwards records as `tracing` events under the `deltatrace` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, record: &TraceRecord) {
        if record.metric.is_warning() {
            tracing::warn!(
                target: "deltatrace",
                file = record.file,
                line = record.line,
                metric = record.metric.tag(),
                "{}",
                record
            );
        } else {
            tracing::info!(
                target: "deltatrace",
                file = record.file,
                line = record.line,
                label = record.label,
                metric = record.metric.tag(),
                value = record.metric.value(),
                unit = record.metric.unit(),
                "{}",
                record
            );
        }
    }
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _record: &TraceRecord) {}
}

/// Collects records in memory
///
/// Takes a mutex per record, so keep it out of timing-sensitive runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of records whose metric satisfies `predicate`
    pub fn count(&self, predicate: impl Fn(&Metric) -> bool) -> usize {
        self.records
            .lock()
            .map(|records| records.iter().filter(|r| predicate(&r.metric)).count())
            .unwrap_or(0)
    }

    /// Measured deltas in emission order
    pub fn durations(&self) -> Vec<u64> {
        self.records()
            .iter()
            .filter_map(|r| match r.metric {
                Metric::Duration { delta_ns } => Some(delta_ns),
                _ => None,
            })
            .collect()
    }

    pub fn imbalance_count(&self) -> usize {
        self.count(|m| matches!(m, Metric::Imbalance))
    }

    pub fn overflow_count(&self) -> usize {
        self.count(|m| matches!(m, Metric::CapacityOverflow { .. }))
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, record: &TraceRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(*record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(metric: Metric) -> TraceRecord {
        TraceRecord::new("src/dispatch.rs", 42, "pick_next", metric)
    }

    #[test]
    fn test_duration_rendering_columns() {
        let line = record(Metric::Duration { delta_ns: 812 }).to_string();
        assert!(line.starts_with(&format!("{:>27} +  42 pick_next", "src/dispatch.rs")));
        assert!(line.ends_with(" t_delta:       812 ns"));
    }

    #[test]
    fn test_total_rendering_contains_calls() {
        let line = record(Metric::TotalAndCalls {
            total_ns: 91532,
            calls: 113,
        })
        .to_string();
        assert!(line.ends_with("   t_tot:     91532 ns,   calls:       113"));
    }

    #[test]
    fn test_imbalance_rendering() {
        let line = TraceRecord::new("a.rs", 7, "", Metric::Imbalance).to_string();
        assert!(line.ends_with(IMBALANCE_MESSAGE));
        assert!(line.contains("+   7 "));
    }

    #[test]
    fn test_overflow_rendering_names_required_capacity() {
        let line = record(Metric::CapacityOverflow {
            capacity: 2,
            required: 3,
        })
        .to_string();
        assert!(line.contains(OVERFLOW_MESSAGE));
        assert!(line.contains("time_deltas_init!(3)"));
        assert!(line.contains("(capacity 2)"));
    }

    #[test]
    fn test_metric_tags_and_units() {
        assert_eq!(Metric::Duration { delta_ns: 1 }.tag(), "t_delta");
        assert_eq!(
            Metric::TotalAndCalls {
                total_ns: 1,
                calls: 1
            }
            .tag(),
            "t_tot"
        );
        assert_eq!(Metric::Imbalance.tag(), "WARNING");
        assert_eq!(Metric::Imbalance.value(), None);
        assert_eq!(Metric::Duration { delta_ns: 9 }.unit(), Some("ns"));
        assert!(Metric::Imbalance.is_warning());
        assert!(!Metric::Duration { delta_ns: 9 }.is_warning());
    }

    #[test]
    fn test_memory_sink_collects_and_counts() {
        let sink = MemorySink::new();
        sink.emit(&record(Metric::Duration { delta_ns: 5 }));
        sink.emit(&record(Metric::Imbalance));
        sink.emit(&record(Metric::Duration { delta_ns: 7 }));

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.durations(), vec![5, 7]);
        assert_eq!(sink.imbalance_count(), 1);
        assert_eq!(sink.overflow_count(), 0);

        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_stderr_and_tracing_sinks_do_not_panic() {
        StderrSink.emit(&record(Metric::Duration { delta_ns: 1 }));
        TracingSink.emit(&record(Metric::Imbalance));
        NullSink.emit(&record(Metric::Imbalance));
    }

    #[test]
    fn test_shared_sink_forwards() {
        let sink = Arc::new(MemorySink::new());
        let shared: Arc<MemorySink> = Arc::clone(&sink);
        shared.emit(&record(Metric::Duration { delta_ns: 3 }));
        assert_eq!(sink.durations(), vec![3]);
    }
}
