//! deltatrace - rough start/stop time deltas for hot code paths
//!
//! Bracket pieces of a function with start/stop calls and get, per piece,
//! the duration of each run plus a cumulative total and call count that
//! survive across invocations of the function:
//!
//! ```
//! use deltatrace::time_deltas_init;
//!
//! fn dispatch(queue: &mut Vec<u32>) -> Option<u32> {
//!     let mut rec = time_deltas_init!(2);
//!
//!     rec.record_start();
//!     queue.sort_unstable();
//!     rec.record_stop("sort_queue");
//!
//!     rec.record_start();
//!     let next = queue.pop();
//!     rec.record_stop("pop_next");
//!
//!     next
//! }
//!
//! assert_eq!(dispatch(&mut vec![3, 1, 2]), Some(3));
//! ```
//!
//! The slot array lives on the stack, aggregates are lock-free atomics, and
//! records are `Copy`, so the measurement path neither allocates nor locks.
//! Building without the `time-deltas` feature, or with
//! `instrumentation_enabled = false`, turns every recorder into a no-op.

pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod demo;
pub mod host_log;
pub mod recorder;
pub mod registry;
pub mod ring_buffer;
pub mod summary;
pub mod trace_sink;

/// Compile-time master switch, set by the `time-deltas` feature
pub const ENABLED: bool = cfg!(feature = "time-deltas");

/// Start a recorder with room for `capacity` regions at this call site
///
/// The first form uses the process-wide context from
/// [`context::current`]; the second takes an explicit
/// [`Instrumentation`](context::Instrumentation) reference. Either way the
/// aggregates go to the global registry under this expansion's own
/// [`CallSite`](registry::CallSite), and no table is created while
/// instrumentation is off.
#[cfg(feature = "time-deltas")]
#[macro_export]
macro_rules! time_deltas_init {
    ($capacity:expr) => {
        $crate::time_deltas_init!($capacity, $crate::context::current())
    };
    ($capacity:expr, $ctx:expr) => {{
        static __DELTATRACE_SITE: $crate::registry::SiteCache = $crate::registry::SiteCache::new();
        let ctx: &$crate::context::Instrumentation = $ctx;
        if ctx.policy().is_active() {
            let table = __DELTATRACE_SITE.resolve(
                $crate::registry::AggregateRegistry::global(),
                $crate::registry::CallSite::new(module_path!(), file!(), line!())
                    .with_column(column!()),
                $capacity,
            );
            $crate::recorder::Recorder::<{ $capacity }>::with_context(table, ctx)
        } else {
            $crate::recorder::Recorder::<{ $capacity }>::disabled()
        }
    }};
}

/// Start a recorder with room for `capacity` regions at this call site
///
/// Built without the `time-deltas` feature: yields a zero-sized inert
/// recorder without touching the installed context or the registry. An
/// explicit context argument is still type-checked.
#[cfg(not(feature = "time-deltas"))]
#[macro_export]
macro_rules! time_deltas_init {
    ($capacity:expr) => {
        $crate::recorder::Recorder::<{ $capacity }>::disabled()
    };
    ($capacity:expr, $ctx:expr) => {{
        let _: &$crate::context::Instrumentation = $ctx;
        $crate::recorder::Recorder::<{ $capacity }>::disabled()
    }};
}
