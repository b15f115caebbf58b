//! Property-based tests for the recorder protocol and trace tooling
//!
//! Random start/stop sequences are replayed against a small reference model
//! of the protocol. Designed to run in a few seconds.
//!
//! Properties tested:
//! 1. Warning counts, call counts, and the cursor match the model
//! 2. Slot totals add up to the emitted durations
//! 3. A disabled recorder touches nothing
//! 4. Rendered records parse back into the same figures

#![cfg(feature = "time-deltas")]

use deltatrace::clock::ManualClock;
use deltatrace::config::{OverflowPolicy, ReportingPolicy};
use deltatrace::recorder::{Recorder, RecorderState};
use deltatrace::registry::{AggregateTable, CallSite};
use deltatrace::summary::{TraceLine, TraceParser};
use deltatrace::trace_sink::{MemorySink, Metric, TraceRecord};
use proptest::prelude::*;

const CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy)]
enum Op {
    Start,
    Stop,
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Start),
        3 => Just(Op::Stop),
        2 => (1u64..10_000).prop_map(Op::Advance),
    ]
}

/// What a recorder session should report for a sequence of operations
#[derive(Debug, Default)]
struct Model {
    awaiting_stop: bool,
    cursor: usize,
    imbalances: usize,
    overflows: usize,
    durations: usize,
    calls: [u64; CAPACITY],
}

impl Model {
    fn apply(&mut self, op: Op) {
        match op {
            Op::Start => {
                if self.awaiting_stop {
                    self.imbalances += 1;
                }
                self.awaiting_stop = true;
                if self.cursor < CAPACITY {
                    self.calls[self.cursor] += 1;
                }
            }
            Op::Stop => {
                if !self.awaiting_stop {
                    self.imbalances += 1;
                }
                self.awaiting_stop = false;
                if self.cursor < CAPACITY {
                    self.durations += 1;
                } else {
                    self.overflows += 1;
                }
                self.cursor += 1;
            }
            Op::Advance(_) => {}
        }
    }
}

fn table() -> AggregateTable {
    AggregateTable::new(CallSite::new("prop", "prop.rs", 1), CAPACITY)
}

fn replay(rec: &mut Recorder<'_, CAPACITY>, clock: &ManualClock, ops: &[Op]) {
    for &op in ops {
        match op {
            Op::Start => rec.record_start(),
            Op::Stop => rec.record_stop("region"),
            Op::Advance(ns) => clock.advance(ns),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_session_matches_model(ops in prop::collection::vec(op(), 0..40)) {
        let table = table();
        let clock = ManualClock::new(0);
        let sink = MemorySink::new();
        let mut rec = Recorder::<CAPACITY>::new(&table, &clock, &sink, ReportingPolicy::new());

        replay(&mut rec, &clock, &ops);
        let mut model = Model::default();
        ops.iter().for_each(|&op| model.apply(op));

        prop_assert_eq!(sink.imbalance_count(), model.imbalances);
        prop_assert_eq!(sink.overflow_count(), model.overflows);
        prop_assert_eq!(sink.durations().len(), model.durations);
        prop_assert_eq!(rec.cursor(), model.cursor);
        let expected_state = if model.awaiting_stop {
            RecorderState::AwaitingStop
        } else {
            RecorderState::AwaitingStart
        };
        prop_assert_eq!(rec.state(), expected_state);

        let snapshot = table.snapshot();
        for (slot, entry) in snapshot.entries.iter().enumerate() {
            prop_assert_eq!(entry.call_count, model.calls[slot]);
        }
    }

    #[test]
    fn prop_totals_equal_emitted_durations(ops in prop::collection::vec(op(), 0..40)) {
        let table = table();
        let clock = ManualClock::new(1_000_000);
        let sink = MemorySink::new();
        let mut rec = Recorder::<CAPACITY>::new(&table, &clock, &sink, ReportingPolicy::new());

        replay(&mut rec, &clock, &ops);

        let emitted: u64 = sink.durations().iter().sum();
        prop_assert_eq!(table.snapshot().total_ns(), emitted);
        for slot in 0..rec.cursor().min(CAPACITY) {
            prop_assert!(rec.delta(slot).is_some());
        }
        prop_assert!(rec.delta(CAPACITY).is_none());
    }

    #[test]
    fn prop_warn_once_reports_at_most_one_overflow(
        ops in prop::collection::vec(op(), 0..40),
    ) {
        let table = table();
        let clock = ManualClock::new(0);
        let sink = MemorySink::new();
        let policy = ReportingPolicy::new().with_overflow(OverflowPolicy::WarnOnce);
        let mut rec = Recorder::<CAPACITY>::new(&table, &clock, &sink, policy);

        replay(&mut rec, &clock, &ops);

        let stops = ops.iter().filter(|op| matches!(op, Op::Stop)).count();
        let expected = usize::from(stops > CAPACITY);
        prop_assert_eq!(sink.overflow_count(), expected);
    }

    #[test]
    fn prop_disabled_recorder_is_inert(ops in prop::collection::vec(op(), 0..40)) {
        let table = table();
        let clock = ManualClock::new(0);
        let sink = MemorySink::new();
        let mut rec =
            Recorder::<CAPACITY>::new(&table, &clock, &sink, ReportingPolicy::disabled());

        replay(&mut rec, &clock, &ops);

        prop_assert!(sink.records().is_empty());
        prop_assert_eq!(rec.cursor(), 0);
        prop_assert!(table.snapshot().entries.iter().all(|e| e.call_count == 0 && e.total_ns == 0));
    }

    #[test]
    fn prop_rendered_records_parse_back(
        file in prop::sample::select(vec!["src/a.rs", "kernel/sched/core.c", "x.rs"]),
        line in 1u32..100_000,
        label in prop::sample::select(vec!["pick_next", "lock wait", "a", ""]),
        total_ns in any::<u64>(),
        calls in any::<u64>(),
    ) {
        let parser = TraceParser::new().unwrap();
        let record = TraceRecord::new(file, line, label, Metric::TotalAndCalls { total_ns, calls });

        let parsed = parser.parse_line(&record.to_string());
        prop_assert_eq!(
            parsed,
            Some(TraceLine::Total {
                location: format!("{} +{}", file, line),
                label: label.to_string(),
                total_ns,
                calls,
            })
        );
    }
}
