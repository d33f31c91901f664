use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use alloy_primitives::B256;
use parking_lot::Mutex;

use super::{TaskState, TransferResult};

/// Live counters of one task. Written only by the task's own loop.
#[derive(Debug, Default)]
pub struct TaskCounters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    steps: Mutex<BTreeMap<B256, u64>>,
}

impl TaskCounters {
    /// Records one attempt round and its outcome. `steps` are the trigger signatures a
    /// successful round exercised.
    pub fn record(&self, result: TransferResult, steps: &[B256]) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match result {
            TransferResult::Success => {
                if !steps.is_empty() {
                    let mut counts = self.steps.lock();
                    for step in steps {
                        *counts.entry(*step).or_default() += 1;
                    }
                }
                self.success.fetch_add(1, Ordering::Release);
            }
            TransferResult::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            TransferResult::NonceBlocked => {}
        }
    }

    /// Successful rounds so far.
    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Acquire)
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> TaskStats {
        TaskStats {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Relaxed),
            steps: self.steps.lock().clone(),
        }
    }
}

/// Snapshot of a task's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Attempt rounds, including nonce-blocked ones.
    pub total: u64,
    /// Successful rounds.
    pub success: u64,
    /// Failed rounds.
    pub failed: u64,
    /// Successful rounds per exercised trigger signature.
    pub steps: BTreeMap<B256, u64>,
}

impl TaskStats {
    /// Rounds refused by the nonce lock.
    pub const fn collisions(&self) -> u64 {
        self.total.saturating_sub(self.success).saturating_sub(self.failed)
    }

    fn rate(&self, count: u64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        count as f64 / self.total as f64 * 100.0
    }

    /// Success share of all rounds, in percent.
    pub fn success_rate(&self) -> f64 {
        self.rate(self.success)
    }

    /// Failure share of all rounds, in percent.
    pub fn failed_rate(&self) -> f64 {
        self.rate(self.failed)
    }

    /// Collision share of all rounds, in percent.
    pub fn collision_rate(&self) -> f64 {
        self.rate(self.collisions())
    }

    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.success += other.success;
        self.failed += other.failed;
        for (step, count) in &other.steps {
            *self.steps.entry(*step).or_default() += count;
        }
    }
}

/// One status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    /// Task name.
    pub name: String,
    /// State when the status was taken.
    pub state: TaskState,
    /// Counters when the status was taken.
    pub stats: TaskStats,
}

impl TaskStatus {
    /// Whether the task still has work in flight.
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = match self.state {
            TaskState::Running => "is running",
            TaskState::StopRequested => "is stopping",
            TaskState::Idle => "is not running",
        };
        write!(
            f,
            "{} {running}, total:{}, succeeded:{}, failed:{}, success rate:{:.2}%, failed rate:{:.2}%, nonce collision rate:{:.2}%",
            self.name,
            self.stats.total,
            self.stats.success,
            self.stats.failed,
            self.stats.success_rate(),
            self.stats.failed_rate(),
            self.stats.collision_rate(),
        )
    }
}
