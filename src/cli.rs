//! CLI argument parsing for deltatrace

use crate::config::OverflowPolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Where demo trace records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Write each record to stderr as it happens
    Stderr,
    /// Keep records in a ring buffer and dump it after the run
    Ring,
    /// Forward records as tracing events (needs --debug to be visible)
    Tracing,
}

/// Output format for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "deltatrace")]
#[command(version)]
#[command(about = "Rough start/stop time deltas for hot code paths", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the instrumented dispatcher workload and print its totals
    Demo(DemoArgs),
    /// Summarise cumulative totals from a saved trace
    Summarize(SummarizeArgs),
}

#[derive(clap::Args, Debug)]
pub struct DemoArgs {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Requests submitted per worker thread
    #[arg(short = 'n', long, default_value = "1000")]
    pub iterations: u64,

    /// Concurrent worker threads sharing the instrumented call site
    #[arg(short, long, default_value = "1")]
    pub threads: usize,

    /// Workload random seed
    #[arg(long, default_value = "24301")]
    pub seed: u64,

    /// Trace sink for per-region records
    #[arg(long, value_enum, default_value = "ring")]
    pub sink: SinkKind,

    /// Do not emit per-region t_delta records
    #[arg(long)]
    pub no_durations: bool,

    /// Do not emit t_tot/calls records
    #[arg(long)]
    pub no_totals: bool,

    /// Run with instrumentation disabled
    #[arg(long)]
    pub disable: bool,

    /// What an overflowing stop reports
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowPolicy>,

    /// Keep the dispatcher's own logging on while measuring
    #[arg(long)]
    pub keep_host_logs: bool,
}

#[derive(clap::Args, Debug)]
pub struct SummarizeArgs {
    /// Trace text to summarise
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Only consider lines containing this text, cut to start at it
    #[arg(long, value_name = "PREFIX")]
    pub filter: Option<String>,
}
