//! boundq - Run producers and consumers over a bounded queue.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use boundq::{EventSink, LineSink, Pipeline, PipelineReport, Strategy, TracingSink};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Overrides;

/// Run N producers and M consumers over one bounded queue.
///
/// Every producer pushes a distinct run of integers, consumers drain the
/// queue until it is closed, and the delivery is checked: every item
/// exactly once, each producer's items in order.
#[derive(Parser, Debug)]
#[command(name = "boundq")]
#[command(about = "Bounded producer/consumer queue runner")]
#[command(version)]
struct Args {
    /// Pipeline config file (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Queue capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Items pushed by each producer
    #[arg(long)]
    items: Option<usize>,

    /// Number of producer threads
    #[arg(long)]
    producers: Option<usize>,

    /// Number of consumer threads
    #[arg(long)]
    consumers: Option<usize>,

    /// Blocking strategy: lock or semaphore
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Pause after every push, in milliseconds
    #[arg(long)]
    produce_delay_ms: Option<u64>,

    /// Pause after every pop, in milliseconds
    #[arg(long)]
    consume_delay_ms: Option<u64>,

    /// Print "Produced: n" / "Consumed: n" lines as items move
    #[arg(long)]
    console: bool,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            capacity: self.capacity,
            items: self.items,
            producers: self.producers,
            consumers: self.consumers,
            strategy: self.strategy,
            produce_delay_ms: self.produce_delay_ms,
            consume_delay_ms: self.consume_delay_ms,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::resolve(args.config.as_deref(), &args.overrides())?;

    let sink: Arc<dyn EventSink> = if args.console {
        Arc::new(LineSink::stdout())
    } else {
        Arc::new(TracingSink)
    };

    let report = Pipeline::new(cfg.clone())?.with_sink(sink).run()?;
    report
        .verify(&cfg.sources())
        .context("pipeline delivered the wrong items")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let expected = cfg.total_items().context("item count overflows")?;
        print_summary(&report, expected);
    }
    Ok(())
}

fn print_summary(report: &PipelineReport, expected: u64) {
    println!();
    println!("=== {} strategy, capacity {} ===", report.strategy, report.capacity);
    for p in &report.producers {
        println!("  {:<12} pushed   {:>8}  ({} ms)", p.name, p.pushed, p.elapsed.as_millis());
    }
    for c in &report.consumers {
        println!("  {:<12} consumed {:>8}  ({} ms)", c.name, c.consumed, c.elapsed.as_millis());
    }
    println!(
        "  total        {:>8} / {} in {} ms",
        report.total_delivered(),
        expected,
        report.elapsed.as_millis()
    );
    println!();
    println!("All items produced and consumed successfully!");
}
