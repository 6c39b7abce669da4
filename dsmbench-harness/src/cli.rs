use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use yansi::Paint;

use crate::bench::{self, NodeSummary};
use crate::config::{Config, Overrides};
use crate::observability;

/// Benchmark a shared index with a skewed read/write workload.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// verify the index before benchmarking
    #[argh(switch)]
    verify: bool,

    /// stop measuring after this many seconds instead of running until killed
    #[argh(option)]
    duration: Option<u64>,

    /// number of nodes in the cluster
    #[argh(positional)]
    node_count: usize,

    /// percentage of requests that are reads
    #[argh(positional)]
    read_ratio: u8,

    /// number of worker threads per node
    #[argh(positional)]
    thread_count: usize,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            node_count: Some(self.node_count),
            read_ratio: Some(self.read_ratio),
            thread_count: Some(self.thread_count),
            verify: self.verify.then_some(true),
            duration: self.duration.map(Duration::from_secs),
        }
    }
}

/// Parses the command line, runs the benchmark and prints the final summary.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref(), args.overrides())
        .context("failed to load configuration")?;

    observability::init_tracing(&config);
    tracing::debug!(?config);

    config.validate()?;
    println!(
        "nodes {}, read ratio {}%, threads per node {}",
        config.node_count, config.read_ratio, config.thread_count
    );

    let summaries = bench::run_local(&config)?;
    print_summaries(&summaries);

    Ok(())
}

fn print_summaries(summaries: &[NodeSummary]) {
    println!();
    println!("{}", "## SUMMARY".bold());

    let mut ops = 0;
    let mut throughput = 0.0;
    for summary in summaries {
        ops += summary.ops;
        throughput += summary.throughput();

        println!(
            "{} {} ({} ops in {:.2?}, warmup {:.2?})",
            "node".bold(),
            summary.node.bold().blue(),
            summary.ops.bold(),
            summary.elapsed,
            summary.warmup,
        );
        println!("  {:.4} operations/us", summary.throughput().bold());
        if let Some(latency) = summary.latency {
            println!("  {latency}");
        }
        if let Some(rate) = summary.cache.hit_rate() {
            println!("  cache hit rate: {rate:.6}");
        }
    }

    println!(
        "{} {} ops, {:.3} operations/us",
        "TOTAL:".bold().green(),
        ops.bold(),
        throughput.bold()
    );
}
