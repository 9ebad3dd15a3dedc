mod bench;
mod cli;
mod plan;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use callq_core::{load_dotenv, QueueConfig};
use callq_queue::CallbackQueue;

use crate::cli::{BenchArgs, CliArgs, Command, RunArgs};
use crate::plan::Plan;

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    match args.command {
        Command::Run(run) => run_plan(run),
        Command::Bench(bench) => run_bench(bench),
    }
}

fn run_plan(args: RunArgs) -> Result<()> {
    let plan = Plan::from_file(&args.plan)
        .with_context(|| format!("failed to load plan {}", args.plan.display()))?;

    // CLI flag > plan [queue] table > CALLQ_* environment.
    let mut config = match &plan.queue {
        Some(config) => config.clone(),
        None => QueueConfig::from_env().context("invalid CALLQ_* environment")?,
    };
    if let Some(threads) = args.threads {
        config.worker_threads = threads;
    }
    config.log_summary();

    let queue = CallbackQueue::with_config(config).context("failed to start worker threads")?;
    info!(tasks = plan.tasks.len(), "running plan");
    let report = plan.run(&queue).context("plan run failed")?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

fn run_bench(args: BenchArgs) -> Result<()> {
    let mut config = QueueConfig::from_env().context("invalid CALLQ_* environment")?;
    config.worker_threads = args.threads;
    config.log_summary();

    let queue = CallbackQueue::with_config(config).context("failed to start worker threads")?;
    info!(
        tasks = args.tasks,
        chains = args.chains,
        chain_length = args.chain_length,
        "starting benchmark"
    );
    let report = bench::run(&queue, &args).context("benchmark failed")?;

    println!("{}", report.stats);
    println!(
        "Submitted {} tasks in {:.2?} ({:.0} tasks/s)",
        report.submitted,
        report.elapsed,
        report.tasks_per_sec()
    );
    Ok(())
}
