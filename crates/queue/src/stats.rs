use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Running totals updated by whichever thread executes or moves a task.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    executed: AtomicU64,
    panicked: AtomicU64,
    inline_executed: AtomicU64,
    claimed_by_waiters: AtomicU64,
    past_due: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn record_execution(&self, panicked: bool) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_inline(&self) {
        self.inline_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_claim(&self) {
        self.claimed_by_waiters.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_past_due(&self, count: usize) {
        self.past_due.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of a queue, for diagnostics and dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_id: u64,
    /// Target worker count.
    pub number_of_threads: usize,
    /// Worker threads still tracked by the pool.
    pub live_workers: usize,
    /// Tasks waiting in the ready queue.
    pub queue_depth: usize,
    /// Tasks waiting on prior futures.
    pub on_hold: usize,
    /// Payloads run to completion (including panicked ones).
    pub executed: u64,
    pub panicked: u64,
    /// Tasks run by the thread that resolved their last dependency.
    pub inline_executed: u64,
    /// Tasks pulled out of the ready queue by a blocked `wait`.
    pub claimed_by_waiters: u64,
    /// Tasks re-enqueued at the front once their dependencies resolved.
    pub past_due_reinserted: u64,
    pub taken_at: DateTime<Utc>,
}

impl QueueStats {
    pub(crate) fn from_parts(
        queue_id: u64,
        number_of_threads: usize,
        live_workers: usize,
        queue_depth: usize,
        on_hold: usize,
        counters: &QueueCounters,
    ) -> Self {
        Self {
            queue_id,
            number_of_threads,
            live_workers,
            queue_depth,
            on_hold,
            executed: counters.executed.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
            inline_executed: counters.inline_executed.load(Ordering::Relaxed),
            claimed_by_waiters: counters.claimed_by_waiters.load(Ordering::Relaxed),
            past_due_reinserted: counters.past_due.load(Ordering::Relaxed),
            taken_at: Utc::now(),
        }
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue {}:", self.queue_id)?;
        writeln!(f, "  Threads: {} ({} live)", self.number_of_threads, self.live_workers)?;
        writeln!(f, "  Callback queue size: {}", self.queue_depth)?;
        writeln!(f, "  Number of functions on hold: {}", self.on_hold)?;
        write!(
            f,
            "  Executed: {} ({} panicked, {} inline, {} by waiters, {} past due)",
            self.executed,
            self.panicked,
            self.inline_executed,
            self.claimed_by_waiters,
            self.past_due_reinserted
        )
    }
}
