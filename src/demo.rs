//! Instrumented toy request dispatcher
//!
//! Stands in for the host code the recorder is meant to live in: a
//! three-level priority dispatcher whose `dispatch` path is bracketed into
//! regions. It logs through a [`HostLog`], so its own logging goes quiet while
//! instrumentation runs, and its results do not depend on whether anything
//! is measured.

use crate::context::Instrumentation;
use crate::host_log::HostLog;
use crate::registry::AggregateRegistry;
use crate::summary::Summary;
use crate::{host_log, time_deltas_init};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

const PRIORITY_LEVELS: usize = 3;

/// A unit of work waiting to be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub priority: u8,
    pub cost: u32,
}

/// Parameters for [`run_demo`]
#[derive(Debug, Clone, Copy)]
pub struct DemoConfig {
    pub iterations: u64,
    pub threads: usize,
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            iterations: 1_000,
            threads: 1,
            seed: 0x5eed,
        }
    }
}

/// What the dispatchers did; identical with and without instrumentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoReport {
    pub dispatched: u64,
    pub checksum: u64,
}

/// Priority dispatcher with per-level FIFO queues
pub struct Dispatcher<'a> {
    queues: [VecDeque<Request>; PRIORITY_LEVELS],
    served: [u64; PRIORITY_LEVELS],
    instrumentation: &'a Instrumentation,
    log: HostLog,
}

impl<'a> Dispatcher<'a> {
    pub fn new(instrumentation: &'a Instrumentation) -> Self {
        Self {
            queues: Default::default(),
            served: [0; PRIORITY_LEVELS],
            instrumentation,
            log: instrumentation.host_log("dispatch"),
        }
    }

    pub fn log(&self) -> &HostLog {
        &self.log
    }

    pub fn submit(&mut self, request: Request) {
        let level = (request.priority as usize).min(PRIORITY_LEVELS - 1);
        host_log!(self.log, "submit id={} level={}", request.id, level);
        self.queues[level].push_back(request);
    }

    pub fn pending(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Pick, dequeue, and account the next request
    pub fn dispatch(&mut self) -> Option<Request> {
        let mut rec = time_deltas_init!(3, self.instrumentation);

        rec.record_start();
        let level = self.select_level();
        rec.record_stop("select_level");

        rec.record_start();
        let request = level.and_then(|l| self.queues[l].pop_front());
        rec.record_stop("pop_request");

        rec.record_start();
        if let (Some(level), Some(request)) = (level, request) {
            self.served[level] += 1;
            host_log!(
                self.log,
                "dispatch id={} level={} served={}",
                request.id,
                level,
                self.served[level]
            );
        }
        rec.record_stop("account");

        request
    }

    /// Highest non-empty level, letting a lower level through every fourth
    /// pick so it is not starved
    fn select_level(&self) -> Option<usize> {
        let non_empty: Vec<usize> = (0..PRIORITY_LEVELS)
            .rev()
            .filter(|&l| !self.queues[l].is_empty())
            .collect();
        let total_served: u64 = self.served.iter().sum();
        match non_empty.as_slice() {
            [] => None,
            [only] => Some(*only),
            [top, rest @ ..] if total_served % 4 == 3 => rest.first().copied().or(Some(*top)),
            [top, ..] => Some(*top),
        }
    }
}

/// Simulated cost of serving a request
fn serve(request: &Request) -> u64 {
    let mut acc = request.id;
    for i in 0..request.cost {
        acc = acc.rotate_left(5) ^ u64::from(i);
    }
    acc
}

/// One worker: submit a random request, dispatch one, repeat
fn run_worker(instrumentation: &Instrumentation, iterations: u64, seed: u64) -> DemoReport {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dispatcher = Dispatcher::new(instrumentation);
    let mut report = DemoReport::default();

    for id in 0..iterations {
        dispatcher.submit(Request {
            id,
            priority: rng.gen_range(0..PRIORITY_LEVELS as u8),
            cost: rng.gen_range(8..256),
        });
        if let Some(request) = dispatcher.dispatch() {
            report.dispatched += 1;
            report.checksum = report.checksum.wrapping_add(serve(&request));
        }
    }
    while let Some(request) = dispatcher.dispatch() {
        report.dispatched += 1;
        report.checksum = report.checksum.wrapping_add(serve(&request));
    }
    report
}

/// Run `config.threads` dispatchers concurrently, sharing one call site
pub fn run_demo(instrumentation: &Instrumentation, config: DemoConfig) -> DemoReport {
    let threads = config.threads.max(1);
    tracing::debug!(threads, iterations = config.iterations, "starting demo workload");

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let seed = config.seed.wrapping_add(t as u64);
                scope.spawn(move || run_worker(instrumentation, config.iterations, seed))
            })
            .collect();

        workers
            .into_iter()
            .filter_map(|worker| worker.join().ok())
            .fold(DemoReport::default(), |acc, r| DemoReport {
                dispatched: acc.dispatched + r.dispatched,
                checksum: acc.checksum.wrapping_add(r.checksum),
            })
    })
}

/// Summary of everything recorded in the global registry so far
pub fn registry_summary() -> Summary {
    Summary::from_snapshot(&AggregateRegistry::global().snapshot())
}
