//! Process-wide aggregate storage keyed by call site
//!
//! Each instrumented function owns one [`AggregateTable`]: a fixed array of
//! cumulative totals and start counts, one entry per region slot. Tables are
//! created lazily and zero-filled the first time their call site records,
//! then live until the process exits.
//!
//! Counters are `AtomicU64` updated with `Relaxed` ordering. Concurrent
//! invocations of the same call site never lose updates and never block, but
//! a reader may observe a total and a count from slightly different moments.
//!
//! The registry `RwLock` is only taken when a call site is first seen;
//! [`SiteCache`] keeps the resolved table so later invocations go straight to
//! the atomics.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

/// Identity of an instrumented function
///
/// `line!()` and `column!()` name the outermost macro invocation, so two
/// functions generated by one user macro share them. `expansion` tells such
/// siblings apart; `time_deltas_init!` sets it to the address of the
/// expansion's own [`SiteCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallSite {
    pub module: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
    #[serde(skip)]
    pub expansion: usize,
}

impl CallSite {
    pub const fn new(module: &'static str, file: &'static str, line: u32) -> Self {
        Self {
            module,
            file,
            line,
            column: 0,
            expansion: 0,
        }
    }

    pub const fn with_column(mut self, column: u32) -> Self {
        self.column = column;
        self
    }

    pub const fn with_expansion(mut self, expansion: usize) -> Self {
        self.expansion = expansion;
        self
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if self.column != 0 {
            write!(f, ":{}", self.column)?;
        }
        write!(f, " ({})", self.module)
    }
}

/// Cumulative duration and start count of one region slot
#[derive(Debug, Default)]
pub struct AggregateEntry {
    total_ns: AtomicU64,
    call_count: AtomicU64,
}

impl AggregateEntry {
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            call_count: AtomicU64::new(0),
        }
    }

    /// Count one start
    #[inline]
    pub fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a measured delta, returning the new total
    #[inline]
    pub fn add_duration(&self, delta_ns: u64) -> u64 {
        self.total_ns
            .fetch_add(delta_ns, Ordering::Relaxed)
            .wrapping_add(delta_ns)
    }

    pub fn total_ns(&self) -> u64 {
        self.total_ns.load(Ordering::Relaxed)
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            total_ns: self.total_ns(),
            call_count: self.call_count(),
        }
    }
}

/// Plain-data copy of an [`AggregateEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EntrySnapshot {
    pub total_ns: u64,
    pub call_count: u64,
}

impl EntrySnapshot {
    /// Mean duration per start, 0 when never started
    pub fn mean_ns(&self) -> u64 {
        if self.call_count == 0 {
            0
        } else {
            self.total_ns / self.call_count
        }
    }
}

/// Aggregates for every slot of one call site
#[derive(Debug)]
pub struct AggregateTable {
    site: CallSite,
    entries: Box<[AggregateEntry]>,
}

impl AggregateTable {
    pub fn new(site: CallSite, capacity: usize) -> Self {
        Self {
            site,
            entries: (0..capacity).map(|_| AggregateEntry::new()).collect(),
        }
    }

    pub fn site(&self) -> CallSite {
        self.site
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn entry(&self, index: usize) -> Option<&AggregateEntry> {
        self.entries.get(index)
    }

    pub fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            site: self.site,
            entries: self.entries.iter().map(AggregateEntry::snapshot).collect(),
        }
    }
}

/// Plain-data copy of an [`AggregateTable`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteSnapshot {
    pub site: CallSite,
    pub entries: Vec<EntrySnapshot>,
}

impl SiteSnapshot {
    pub fn total_ns(&self) -> u64 {
        self.entries.iter().map(|e| e.total_ns).sum()
    }
}

/// Map from call site to its aggregate table
///
/// Tables are leaked on creation so recorders can hold `&'static`
/// references without reference counting; the set of call sites is fixed by
/// the program text, so this is bounded.
#[derive(Debug, Default)]
pub struct AggregateRegistry {
    tables: RwLock<HashMap<CallSite, &'static AggregateTable>>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by `time_deltas_init!`
    pub fn global() -> &'static AggregateRegistry {
        static GLOBAL: OnceLock<AggregateRegistry> = OnceLock::new();
        GLOBAL.get_or_init(AggregateRegistry::new)
    }

    /// Table for `site`, creating a zeroed one with `capacity` slots if the
    /// site is new
    ///
    /// A site keeps the capacity it was first registered with.
    pub fn get_or_create(&self, site: CallSite, capacity: usize) -> &'static AggregateTable {
        if let Some(table) = self.get(site) {
            if table.capacity() != capacity {
                tracing::warn!(
                    %site,
                    registered = table.capacity(),
                    requested = capacity,
                    "call site re-registered with a different capacity"
                );
            }
            return table;
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        *tables.entry(site).or_insert_with(|| {
            tracing::debug!(%site, capacity, "registering aggregate table");
            Box::leak(Box::new(AggregateTable::new(site, capacity)))
        })
    }

    /// Table for `site`, if it has been registered
    pub fn get(&self, site: CallSite) -> Option<&'static AggregateTable> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&site)
            .copied()
    }

    /// Entry for slot `index` of a registered site
    pub fn entry(&self, site: CallSite, index: usize) -> Option<&'static AggregateEntry> {
        self.get(site).and_then(|table| table.entry(index))
    }

    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every table, ordered by call site
    pub fn snapshot(&self) -> Vec<SiteSnapshot> {
        let mut sites: Vec<SiteSnapshot> = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|table| table.snapshot())
            .collect();
        sites.sort_by(|a, b| a.site.cmp(&b.site));
        sites
    }
}

/// Per-call-site memo of the resolved aggregate table
///
/// `time_deltas_init!` declares one of these as a `static` at each expansion.
/// The cache's address becomes part of the registry key, so every expansion
/// gets its own table even when file, line and column coincide.
#[derive(Debug)]
pub struct SiteCache {
    table: OnceLock<&'static AggregateTable>,
}

impl SiteCache {
    pub const fn new() -> Self {
        Self {
            table: OnceLock::new(),
        }
    }

    #[inline]
    pub fn resolve(
        &self,
        registry: &AggregateRegistry,
        site: CallSite,
        capacity: usize,
    ) -> &'static AggregateTable {
        let expansion = self as *const Self as usize;
        self.table
            .get_or_init(|| registry.get_or_create(site.with_expansion(expansion), capacity))
    }
}

impl Default for SiteCache {
    fn default() -> Self {
        Self::new()
    }
}
