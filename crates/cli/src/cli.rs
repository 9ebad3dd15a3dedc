use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Run task graphs on a callback queue.
#[derive(Parser, Debug)]
#[command(name = "callq", version, about = "Dependency-aware callback queue runner")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a TOML task plan and print the completion order as JSON.
    Run(RunArgs),
    /// Push synthetic work through the queue and report throughput.
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the plan file.
    pub plan: PathBuf,

    /// Worker threads (overrides the plan's `[queue]` table).
    #[arg(long, env = "CALLQ_WORKER_THREADS")]
    pub threads: Option<usize>,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Independent tasks to submit.
    #[arg(long, default_value_t = 10_000)]
    pub tasks: usize,

    /// Dependency chains to submit alongside the independent tasks.
    #[arg(long, default_value_t = 64)]
    pub chains: usize,

    /// Links per chain.
    #[arg(long, default_value_t = 32)]
    pub chain_length: usize,

    /// Worker threads (0 = available parallelism).
    #[arg(long, env = "CALLQ_WORKER_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Resize the pool to this many workers halfway through submission.
    #[arg(long)]
    pub resize_to: Option<usize>,
}
