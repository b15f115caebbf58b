use anyhow::{Context, Result};
use clap::Parser;
use deltatrace::cli::{Cli, Command, DemoArgs, OutputFormat, SinkKind, SummarizeArgs};
use deltatrace::clock::MonotonicClock;
use deltatrace::config::DeltaTraceConfig;
use deltatrace::context::{self, Instrumentation};
use deltatrace::demo::{self, DemoConfig};
use deltatrace::ring_buffer::RingBufferSink;
use deltatrace::summary::Summary;
use deltatrace::trace_sink::{StderrSink, TracingSink};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load the config file (if any) and apply command-line overrides
fn demo_config(args: &DemoArgs) -> Result<DeltaTraceConfig> {
    let mut config = match &args.config {
        Some(path) => DeltaTraceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DeltaTraceConfig::default(),
    };

    let reporting = &mut config.reporting;
    if args.disable {
        reporting.instrumentation_enabled = false;
    }
    if args.no_durations {
        reporting.print_durations = false;
    }
    if args.no_totals {
        reporting.print_totals_and_calls = false;
    }
    if let Some(overflow) = args.overflow {
        reporting.overflow = overflow;
    }
    if args.keep_host_logs {
        reporting.quiet_host_logging = false;
    }

    config.validate()?;
    Ok(config)
}

fn run_demo(args: DemoArgs) -> Result<()> {
    let config = demo_config(&args)?;
    let policy = config.reporting;

    let ring = Arc::new(RingBufferSink::new(config.ring_capacity));
    let instrumentation = match args.sink {
        SinkKind::Ring => Instrumentation::new(policy, MonotonicClock, Arc::clone(&ring)),
        SinkKind::Stderr => Instrumentation::new(policy, MonotonicClock, StderrSink),
        SinkKind::Tracing => Instrumentation::new(policy, MonotonicClock, TracingSink),
    };
    context::install(instrumentation)?;

    let report = demo::run_demo(
        context::current(),
        DemoConfig {
            iterations: args.iterations,
            threads: args.threads,
            seed: args.seed,
        },
    );

    if args.sink == SinkKind::Ring {
        let stats = ring.stats();
        let mut stdout = std::io::stdout().lock();
        ring.dump_to(&mut stdout).context("writing trace records")?;
        if stats.total_overwritten > 0 {
            eprintln!(
                "ring buffer overwrote {} of {} records ({:.1}%)",
                stats.total_overwritten,
                stats.total_pushed,
                stats.loss_rate() * 100.0
            );
        }
    }

    eprintln!(
        "dispatched {} requests (checksum {:#018x})",
        report.dispatched, report.checksum
    );
    let summary = demo::registry_summary();
    if summary.is_empty() {
        eprintln!("No time deltas recorded.");
    } else {
        eprint!("{}", summary.render_text());
    }
    Ok(())
}

fn run_summarize(args: SummarizeArgs) -> Result<()> {
    let file = File::open(&args.trace)
        .with_context(|| format!("opening trace {}", args.trace.display()))?;
    let summary = Summary::from_reader(BufReader::new(file), args.filter.as_deref())?;

    if summary.unrecognized > 0 {
        eprintln!("WARNING {} unrecognized lines skipped", summary.unrecognized);
    }
    match args.format {
        OutputFormat::Text => print!("{}", summary.render_text()),
        OutputFormat::Json => println!("{}", summary.to_json()?),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match args.command {
        Command::Demo(demo_args) => run_demo(demo_args),
        Command::Summarize(summarize_args) => run_summarize(summarize_args),
    }
}
