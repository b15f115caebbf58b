//! Concurrent use of one instrumented call site
//!
//! Every thread runs the same function, so all of them record into the same
//! aggregate table. Totals and counts must come out exact.

#![cfg(feature = "time-deltas")]

use deltatrace::clock::{ClockSource, ManualClock};
use deltatrace::config::ReportingPolicy;
use deltatrace::context::Instrumentation;
use deltatrace::registry::{AggregateRegistry, AggregateTable};
use deltatrace::time_deltas_init;
use deltatrace::trace_sink::NullSink;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const CALLS_PER_THREAD: u64 = 2_000;

/// Two regions advancing the shared clock by 3 and 5 ns
fn instrumented<'a>(ctx: &'a Instrumentation, clock: &ManualClock) -> &'a AggregateTable {
    let mut rec = time_deltas_init!(2, ctx);
    rec.record_start();
    clock.advance(3);
    rec.record_stop("first");
    rec.record_start();
    clock.advance(5);
    rec.record_stop("second");
    rec.table().unwrap()
}

#[test]
fn test_call_counts_exact_under_contention() {
    let clock = Arc::new(ManualClock::new(0));
    let ctx = Instrumentation::new(ReportingPolicy::new(), Arc::clone(&clock), NullSink);

    let tables: Vec<&AggregateTable> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let ctx = &ctx;
                let clock = &clock;
                scope.spawn(move || {
                    let mut table = None;
                    for _ in 0..CALLS_PER_THREAD {
                        table = Some(instrumented(ctx, clock));
                    }
                    table.unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let first = tables[0];
    assert!(tables.iter().all(|t| std::ptr::eq(*t, first)));

    let snapshot = first.snapshot();
    let expected_calls = THREADS as u64 * CALLS_PER_THREAD;
    assert_eq!(snapshot.entries[0].call_count, expected_calls);
    assert_eq!(snapshot.entries[1].call_count, expected_calls);

    // Other threads' advances may land inside a region; a thread's own never
    // land outside one
    assert!(snapshot.entries[0].total_ns >= 3 * expected_calls);
    assert!(snapshot.entries[1].total_ns >= 5 * expected_calls);
    assert_eq!(clock.now_ns(), 8 * expected_calls);
}

#[test]
fn test_single_thread_totals_are_exact() {
    let clock = Arc::new(ManualClock::new(0));
    let ctx = Instrumentation::new(ReportingPolicy::new(), Arc::clone(&clock), NullSink);

    let mut table = None;
    for _ in 0..10 {
        let mut rec = time_deltas_init!(1, &ctx);
        rec.record_start();
        clock.advance(7);
        rec.record_stop("only");
        table = rec.table();
    }

    let entry = table.unwrap().entry(0).unwrap().snapshot();
    assert_eq!(entry.call_count, 10);
    assert_eq!(entry.total_ns, 70);
    assert_eq!(entry.mean_ns(), 7);
}

#[test]
fn test_registry_lists_every_site_once() {
    let ctx = Instrumentation::new(ReportingPolicy::new(), ManualClock::new(0), NullSink);

    for _ in 0..3 {
        let mut rec = time_deltas_init!(1, &ctx);
        rec.record_start();
        rec.record_stop("looped");
    }

    let registry = AggregateRegistry::global();
    let looped: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|site| site.site.file == file!())
        .filter(|site| site.entries.first().map(|e| e.call_count) == Some(3))
        .collect();
    assert_eq!(looped.len(), 1);
    assert_eq!(looped[0].site.module, module_path!());
}

#[test]
fn test_private_registry_shares_tables_across_threads() {
    let registry = AggregateRegistry::new();
    let site = deltatrace::registry::CallSite::new("threads", "threads.rs", 1);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let table = registry.get_or_create(site, 4);
                for slot in 0..4 {
                    let entry = table.entry(slot).unwrap();
                    entry.record_call();
                    entry.add_duration(slot as u64 + 1);
                }
            });
        }
    });

    assert_eq!(registry.len(), 1);
    let snapshot = registry.get(site).unwrap().snapshot();
    for (slot, entry) in snapshot.entries.iter().enumerate() {
        assert_eq!(entry.call_count, THREADS as u64);
        assert_eq!(entry.total_ns, THREADS as u64 * (slot as u64 + 1));
    }
}
