//! Summaries of cumulative totals
//!
//! Builds a "where did the time go" table either from trace text (a saved
//! trace buffer, a stderr capture) or directly from the aggregate registry.
//! For trace text, the `t_tot`/`calls` records are cumulative, so the row
//! kept for each location is its largest one: the most recent total.
//!
//! ```text
//! +----------------------------+-----------+------------+----------+
//! | location                   | label     |   t_tot_us |    calls |
//! +----------------------------+-----------+------------+----------+
//! | src/dispatch.rs +42        | pick_next |     91.532 |      113 |
//! +----------------------------+-----------+------------+----------+
//! t_tot sum: 91.532 us
//! ```

use crate::registry::SiteSnapshot;
use crate::trace_sink::{IMBALANCE_MESSAGE, OVERFLOW_MESSAGE};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufRead;
use thiserror::Error;

/// Errors from building a summary
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid trace pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for summary operations
pub type Result<T> = std::result::Result<T, SummaryError>;

/// One recognised trace line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    Duration {
        location: String,
        label: String,
        delta_ns: u64,
    },
    Total {
        location: String,
        label: String,
        total_ns: u64,
        calls: u64,
    },
    Warning {
        location: String,
        message: String,
    },
}

/// Compiled patterns for trace lines
#[derive(Debug, Clone)]
pub struct TraceParser {
    duration: Regex,
    total: Regex,
    warning: Regex,
}

impl TraceParser {
    pub fn new() -> Result<Self> {
        const PREFIX: &str = r"(?P<file>\S+)\s+\+\s*(?P<line>\d+)\s+";
        Ok(Self {
            duration: Regex::new(&format!(
                r"{PREFIX}(?P<label>.*?)\s*t_delta:\s+(?P<delta>\d+)\s+ns\s*$"
            ))?,
            total: Regex::new(&format!(
                r"{PREFIX}(?P<label>.*?)\s*t_tot:\s+(?P<total>\d+)\s+ns,\s+calls:\s+(?P<calls>\d+)\s*$"
            ))?,
            warning: Regex::new(&format!(r"{PREFIX}(?P<message>WARNING.*?)\s*$"))?,
        })
    }

    /// Classify one line; `None` for anything that is not a record
    pub fn parse_line(&self, line: &str) -> Option<TraceLine> {
        let location = |caps: &regex::Captures<'_>| format!("{} +{}", &caps["file"], &caps["line"]);

        if let Some(caps) = self.total.captures(line) {
            return Some(TraceLine::Total {
                location: location(&caps),
                label: caps["label"].trim().to_string(),
                total_ns: caps["total"].parse().ok()?,
                calls: caps["calls"].parse().ok()?,
            });
        }
        if let Some(caps) = self.duration.captures(line) {
            return Some(TraceLine::Duration {
                location: location(&caps),
                label: caps["label"].trim().to_string(),
                delta_ns: caps["delta"].parse().ok()?,
            });
        }
        if let Some(caps) = self.warning.captures(line) {
            let message = caps["message"].trim();
            if message.starts_with(IMBALANCE_MESSAGE) || message.starts_with(OVERFLOW_MESSAGE) {
                return Some(TraceLine::Warning {
                    location: location(&caps),
                    message: message.to_string(),
                });
            }
        }
        None
    }
}

/// Cumulative figures for one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub location: String,
    pub label: String,
    pub total_ns: u64,
    pub calls: u64,
}

impl SummaryRow {
    pub fn total_us(&self) -> f64 {
        self.total_ns as f64 / 1_000.0
    }

    pub fn mean_ns(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_ns / self.calls
        }
    }
}

/// Totals per location, sorted by total time descending
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
    /// `t_delta` records seen
    pub durations: usize,
    /// Imbalance and overflow warnings seen
    pub warnings: usize,
    /// Lines that passed the filter but were not records
    pub unrecognized: usize,
}

impl Summary {
    /// Summarise trace text
    ///
    /// With `filter`, only lines containing it are considered, and each is
    /// cut to start at the filter (dropping a trace-buffer prefix such as
    /// `task-123 [001] ....: `). Bytes that are not UTF-8 are replaced, so
    /// binary junk in a capture only costs the lines it lands on.
    pub fn from_reader<R: BufRead>(mut reader: R, filter: Option<&str>) -> Result<Self> {
        let parser = TraceParser::new()?;
        let mut latest: HashMap<String, SummaryRow> = HashMap::new();
        let mut summary = Summary::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let decoded = String::from_utf8_lossy(&buf);
            let line = decoded.trim_end_matches(['\n', '\r']);
            let line = match filter {
                Some(prefix) => match line.find(prefix) {
                    Some(at) => &line[at..],
                    None => continue,
                },
                None => line,
            };
            if line.trim().is_empty() {
                continue;
            }

            match parser.parse_line(line) {
                Some(TraceLine::Total {
                    location,
                    label,
                    total_ns,
                    calls,
                }) => {
                    let row = latest.entry(location.clone()).or_insert(SummaryRow {
                        location,
                        label: label.clone(),
                        total_ns: 0,
                        calls: 0,
                    });
                    if (total_ns, calls) >= (row.total_ns, row.calls) {
                        row.label = label;
                        row.total_ns = total_ns;
                        row.calls = calls;
                    }
                }
                Some(TraceLine::Duration { .. }) => summary.durations += 1,
                Some(TraceLine::Warning { .. }) => summary.warnings += 1,
                None => {
                    summary.unrecognized += 1;
                    tracing::warn!(line, "unrecognized trace line");
                }
            }
        }

        summary.rows = latest.into_values().collect();
        summary.sort();
        Ok(summary)
    }

    /// Summarise the registry directly; one row per used slot
    pub fn from_snapshot(sites: &[SiteSnapshot]) -> Self {
        let mut summary = Summary {
            rows: sites
                .iter()
                .flat_map(|site| {
                    site.entries
                        .iter()
                        .enumerate()
                        .filter(|(_, entry)| entry.call_count > 0)
                        .map(move |(slot, entry)| SummaryRow {
                            location: format!("{} +{}", site.site.file, site.site.line),
                            label: format!("{}[{}]", site.site.module, slot),
                            total_ns: entry.total_ns,
                            calls: entry.call_count,
                        })
                })
                .collect(),
            ..Summary::default()
        };
        summary.sort();
        summary
    }

    fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            b.total_ns
                .cmp(&a.total_ns)
                .then_with(|| a.location.cmp(&b.location))
                .then_with(|| a.label.cmp(&b.label))
        });
    }

    pub fn total_ns(&self) -> u64 {
        self.rows.iter().map(|r| r.total_ns).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a boxed text table followed by the sum of totals
    pub fn render_text(&self) -> String {
        let loc_w = self
            .rows
            .iter()
            .map(|r| r.location.len())
            .chain(std::iter::once("location".len()))
            .max()
            .unwrap_or(0);
        let label_w = self
            .rows
            .iter()
            .map(|r| r.label.len())
            .chain(std::iter::once("label".len()))
            .max()
            .unwrap_or(0);
        let rule = format!(
            "+{}+{}+{}+{}+",
            "-".repeat(loc_w + 2),
            "-".repeat(label_w + 2),
            "-".repeat(14),
            "-".repeat(12)
        );

        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "| {:<loc_w$} | {:<label_w$} | {:>12} | {:>10} |\n",
            "location", "label", "t_tot_us", "calls"
        ));
        out.push_str(&rule);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format!(
                "| {:<loc_w$} | {:<label_w$} | {:>12.3} | {:>10} |\n",
                row.location,
                row.label,
                row.total_us(),
                row.calls
            ));
        }
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "t_tot sum: {:.3} us\n",
            self.total_ns() as f64 / 1_000.0
        ));
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
