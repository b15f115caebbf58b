//! Per-invocation start/stop recorder
//!
//! A [`Recorder`] lives on the stack of the function it measures. It owns a
//! fixed `[u64; N]` slot array, a cursor that advances once per stop, and a
//! flag saying whether a start or a stop is expected next.
//!
//! ```text
//!            record_start()               record_stop(label)
//!  AwaitingStart ─────────────► AwaitingStop ─────────────► AwaitingStart
//!        │  record_stop(): imbalance warning, stays balanced from here
//!        └─ record_start() while AwaitingStop: imbalance warning
//! ```
//!
//! Out-of-order calls and running past `N` are reported through the trace
//! sink and otherwise ignored; the measured function always keeps running.
//!
//! # Example
//!
//! ```
//! use deltatrace::clock::ManualClock;
//! use deltatrace::config::ReportingPolicy;
//! use deltatrace::recorder::Recorder;
//! use deltatrace::registry::{AggregateTable, CallSite};
//! use deltatrace::trace_sink::MemorySink;
//!
//! let table = AggregateTable::new(CallSite::new("doc", "doc.rs", 1), 2);
//! let clock = ManualClock::new(0);
//! let sink = MemorySink::new();
//!
//! let mut rec: Recorder<'_, 2> = Recorder::new(&table, &clock, &sink, ReportingPolicy::new());
//! rec.record_start();
//! clock.advance(40);
//! rec.record_stop("parse");
//!
//! let expected = if deltatrace::ENABLED { 40 } else { 0 };
//! assert_eq!(table.entry(0).unwrap().total_ns(), expected);
//! ```

use crate::clock::ClockSource;
use crate::config::{OverflowPolicy, ReportingPolicy};
use crate::context::Instrumentation;
use crate::registry::AggregateTable;
use crate::trace_sink::{Metric, TraceRecord, TraceSink};
#[cfg(not(feature = "time-deltas"))]
use std::marker::PhantomData;
use std::panic::Location;

/// Which call the recorder expects next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    AwaitingStart,
    AwaitingStop,
}

/// Stack-scoped measurement session with room for `N` regions
///
/// A disabled recorder carries no slot array and never reads the clock,
/// touches the aggregates, or emits a record. Built without the
/// `time-deltas` feature, a recorder is zero-sized.
pub struct Recorder<'a, const N: usize> {
    session: SessionSlot<'a, N>,
}

#[cfg(feature = "time-deltas")]
type SessionSlot<'a, const N: usize> = Option<Session<'a, N>>;

#[cfg(not(feature = "time-deltas"))]
type SessionSlot<'a, const N: usize> = NoSession<'a, N>;

/// Session slot of a build without `time-deltas`; never holds a session
#[cfg(not(feature = "time-deltas"))]
struct NoSession<'a, const N: usize>(PhantomData<Session<'a, N>>);

#[cfg(not(feature = "time-deltas"))]
impl<'a, const N: usize> NoSession<'a, N> {
    #[inline(always)]
    fn as_ref(&self) -> Option<&Session<'a, N>> {
        None
    }

    #[inline(always)]
    fn as_mut(&mut self) -> Option<&mut Session<'a, N>> {
        None
    }

    #[inline(always)]
    fn is_some(&self) -> bool {
        false
    }
}

struct Session<'a, const N: usize> {
    /// Start timestamp while a region is open, then its delta
    slots: [u64; N],
    cursor: usize,
    expect_start: bool,
    overflow_reported: bool,
    table: &'a AggregateTable,
    clock: &'a dyn ClockSource,
    sink: &'a dyn TraceSink,
    policy: ReportingPolicy,
}

impl<'a, const N: usize> Recorder<'a, N> {
    /// Start a session recording into `table`
    ///
    /// Returns an inert recorder when `policy` is inactive.
    pub fn new(
        table: &'a AggregateTable,
        clock: &'a dyn ClockSource,
        sink: &'a dyn TraceSink,
        policy: ReportingPolicy,
    ) -> Self {
        if !policy.is_active() {
            return Self::disabled();
        }

        Self::with_session(Session {
            slots: [0; N],
            cursor: 0,
            expect_start: true,
            overflow_reported: false,
            table,
            clock,
            sink,
            policy,
        })
    }

    #[cfg(feature = "time-deltas")]
    fn with_session(session: Session<'a, N>) -> Self {
        Self {
            session: Some(session),
        }
    }

    #[cfg(not(feature = "time-deltas"))]
    fn with_session(_session: Session<'a, N>) -> Self {
        Self::disabled()
    }

    /// Start a session using the clock, sink, and policy of `ctx`
    pub fn with_context(table: &'a AggregateTable, ctx: &'a Instrumentation) -> Self {
        Self::new(table, ctx.clock(), ctx.sink(), ctx.policy())
    }

    /// A recorder on which every operation is a no-op
    #[cfg(feature = "time-deltas")]
    pub const fn disabled() -> Self {
        Self { session: None }
    }

    /// A recorder on which every operation is a no-op
    #[cfg(not(feature = "time-deltas"))]
    pub const fn disabled() -> Self {
        Self {
            session: NoSession(PhantomData),
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of stops seen so far, including those past capacity
    pub fn cursor(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.cursor)
    }

    pub fn state(&self) -> RecorderState {
        match self.session.as_ref() {
            Some(s) if !s.expect_start => RecorderState::AwaitingStop,
            _ => RecorderState::AwaitingStart,
        }
    }

    /// Aggregates this session records into
    pub fn table(&self) -> Option<&'a AggregateTable> {
        self.session.as_ref().map(|s| s.table)
    }

    /// Delta measured for slot `index` during this session
    pub fn delta(&self, index: usize) -> Option<u64> {
        let session = self.session.as_ref()?;
        if index < session.cursor.min(N) {
            Some(session.slots[index])
        } else {
            None
        }
    }

    /// Open the region at the cursor
    #[track_caller]
    #[inline]
    pub fn record_start(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.start(Location::caller());
        }
    }

    /// Close the region at the cursor and report it as `label`
    ///
    /// A stop with no open region still closes the slot at the cursor: its
    /// delta is measured from whatever the slot holds, which is `0` in a
    /// fresh session. That delta is the raw clock reading, and it is added to
    /// the slot's persistent total. Keep starts and stops paired, or treat a
    /// total that follows an imbalance warning as suspect.
    #[track_caller]
    #[inline]
    pub fn record_stop(&mut self, label: &'static str) {
        if let Some(session) = self.session.as_mut() {
            session.stop(Location::caller(), label);
        }
    }

    /// Run `f` as one region
    #[track_caller]
    pub fn measure<F, R>(&mut self, label: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let location = Location::caller();
        if let Some(session) = self.session.as_mut() {
            session.start(location);
        }
        let result = f();
        if let Some(session) = self.session.as_mut() {
            session.stop(location, label);
        }
        result
    }
}

impl<const N: usize> Session<'_, N> {
    fn start(&mut self, location: &'static Location<'static>) {
        if !self.expect_start {
            self.emit(location, "", Metric::Imbalance);
        }
        self.expect_start = false;

        if self.cursor >= N {
            return;
        }

        if let Some(entry) = self.table.entry(self.cursor) {
            entry.record_call();
        }
        self.slots[self.cursor] = self.clock.now_ns();
    }

    fn stop(&mut self, location: &'static Location<'static>, label: &'static str) {
        if self.expect_start {
            self.emit(location, label, Metric::Imbalance);
        }
        self.expect_start = true;

        if self.cursor >= N {
            let report = match self.policy.overflow {
                OverflowPolicy::WarnOnStop => true,
                OverflowPolicy::WarnOnce => !self.overflow_reported,
                OverflowPolicy::Silent => false,
            };
            if report {
                self.overflow_reported = true;
                self.emit(
                    location,
                    label,
                    Metric::CapacityOverflow {
                        capacity: N,
                        required: self.cursor + 1,
                    },
                );
            }
            self.cursor = self.cursor.saturating_add(1);
            return;
        }

        let i = self.cursor;
        let delta_ns = self.clock.now_ns().saturating_sub(self.slots[i]);
        self.slots[i] = delta_ns;

        let entry = self.table.entry(i);
        let total_ns = entry.map(|e| e.add_duration(delta_ns));

        if self.policy.print_durations {
            self.emit(location, label, Metric::Duration { delta_ns });
        }
        if self.policy.print_totals_and_calls {
            if let (Some(entry), Some(total_ns)) = (entry, total_ns) {
                self.emit(
                    location,
                    label,
                    Metric::TotalAndCalls {
                        total_ns,
                        calls: entry.call_count(),
                    },
                );
            }
        }

        self.cursor += 1;
    }

    #[inline]
    fn emit(&self, location: &'static Location<'static>, label: &'static str, metric: Metric) {
        self.sink.emit(&TraceRecord::new(
            location.file(),
            location.line(),
            label,
            metric,
        ));
    }
}
