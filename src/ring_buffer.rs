//! Lock-free ring buffer trace sink
//!
//! Mirrors how a kernel trace buffer behaves: the hot path only enqueues a
//! `Copy` record, and when the buffer is full the oldest record is
//! overwritten. The recorder is never told about the loss; the buffer only
//! counts it.
//!
//! ```text
//! recorder.record_stop("x") ──► emit() ──► ArrayQueue::force_push
//!                                                 │ (full: oldest evicted)
//!                                                 ▼
//!                               drain() / dump_to() on the cold path
//! ```

use crate::trace_sink::{TraceRecord, TraceSink};
use crossbeam::queue::ArrayQueue;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of records kept
pub const DEFAULT_CAPACITY: usize = 8192;

/// Bounded, overwrite-oldest trace sink
///
/// # Example
///
/// ```
/// use deltatrace::ring_buffer::RingBufferSink;
/// use deltatrace::trace_sink::{Metric, TraceRecord, TraceSink};
///
/// let ring = RingBufferSink::new(2);
/// for delta_ns in [1, 2, 3] {
///     ring.emit(&TraceRecord::new("a.rs", 1, "x", Metric::Duration { delta_ns }));
/// }
///
/// let kept = ring.drain();
/// assert_eq!(kept.len(), 2);
/// assert_eq!(ring.stats().total_overwritten, 1);
/// ```
pub struct RingBufferSink {
    queue: ArrayQueue<TraceRecord>,

    /// Metrics: total records pushed
    total_pushed: AtomicU64,

    /// Metrics: total records evicted to make room
    total_overwritten: AtomicU64,
}

impl RingBufferSink {
    /// Create a ring holding at most `capacity` records
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be > 0");

        Self {
            queue: ArrayQueue::new(capacity),
            total_pushed: AtomicU64::new(0),
            total_overwritten: AtomicU64::new(0),
        }
    }

    /// Remove and return every buffered record, oldest first
    pub fn drain(&self) -> Vec<TraceRecord> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(record) = self.queue.pop() {
            out.push(record);
        }
        out
    }

    /// Drain the buffer into `writer`, one rendered line per record
    pub fn dump_to<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut written = 0;
        while let Some(record) = self.queue.pop() {
            writeln!(writer, "{}", record)?;
            written += 1;
        }
        Ok(written)
    }

    /// Get buffer statistics
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_overwritten: self.total_overwritten.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

impl Default for RingBufferSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TraceSink for RingBufferSink {
    fn emit(&self, record: &TraceRecord) {
        self.total_pushed.fetch_add(1, Ordering::Relaxed);
        if self.queue.force_push(*record).is_some() {
            self.total_overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    pub total_pushed: u64,
    pub total_overwritten: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl BufferStats {
    /// Fraction of pushed records that were overwritten (0.0 to 1.0)
    pub fn loss_rate(&self) -> f64 {
        if self.total_pushed == 0 {
            0.0
        } else {
            self.total_overwritten as f64 / self.total_pushed as f64
        }
    }

    /// Calculate buffer utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.current_size as f64 / self.capacity as f64
    }
}
