use std::hint::black_box;
use std::time::{Duration, Instant};

use tracing::info;

use callq_queue::{CallbackQueue, FutureHandle, QueueError, QueueStats};

use crate::cli::BenchArgs;

#[derive(Debug)]
pub struct BenchReport {
    pub submitted: usize,
    pub elapsed: Duration,
    pub stats: QueueStats,
}

impl BenchReport {
    pub fn tasks_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.submitted as f64 / secs
        } else {
            0.0
        }
    }
}

fn spin(rounds: u64) -> u64 {
    (0..rounds).fold(0u64, |acc, i| black_box(acc.wrapping_mul(31).wrapping_add(i)))
}

/// Interleave independent tasks with dependency chains, optionally resizing
/// the pool halfway through, then wait for everything.
pub fn run(queue: &CallbackQueue, args: &BenchArgs) -> Result<BenchReport, QueueError> {
    let started = Instant::now();
    let total_chain_tasks = args.chains * args.chain_length;
    let total = args.tasks + total_chain_tasks;
    let resize_at = total / 2;

    let mut handles: Vec<FutureHandle> = Vec::with_capacity(total);
    let mut tails: Vec<Option<FutureHandle>> = vec![None; args.chains];
    let mut submitted = 0usize;
    let mut resized = false;

    let mut independent_left = args.tasks;
    let mut chain_left = total_chain_tasks;
    while independent_left > 0 || chain_left > 0 {
        if independent_left > 0 {
            handles.push(queue.push(|| spin(1_000)).into_handle());
            independent_left -= 1;
            submitted += 1;
        }
        if chain_left > 0 {
            let chain = chain_left % args.chains;
            let future = match tails[chain].take() {
                Some(prior) => queue.push_dependent(&[prior], || spin(1_000))?,
                None => queue.push(|| spin(1_000)),
            };
            let handle = future.into_handle();
            tails[chain] = Some(handle.clone());
            handles.push(handle);
            chain_left -= 1;
            submitted += 1;
        }

        if let Some(target) = args.resize_to {
            if !resized && submitted >= resize_at {
                info!(from = queue.number_of_threads(), to = target, "resizing mid-run");
                queue.set_number_of_threads(target)?;
                resized = true;
            }
        }
    }

    queue.wait_all(&handles)?;
    Ok(BenchReport {
        submitted,
        elapsed: started.elapsed(),
        stats: queue.stats(),
    })
}
