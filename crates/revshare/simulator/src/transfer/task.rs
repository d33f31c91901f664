use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{TaskCounters, TaskStats, TaskStatus};
use crate::{TransferSettings, accounts::AccountRegistry, chain::ContractClient};

/// Lifecycle of a transfer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Not running.
    Idle = 0,
    /// Loop is executing.
    Running = 1,
    /// Stop was requested and the loop has not yet returned.
    StopRequested = 2,
}

impl TaskState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::StopRequested,
            _ => Self::Idle,
        }
    }

    /// Whether the loop may still be issuing transactions.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Shared collaborators handed to every task.
#[derive(Clone, Debug)]
pub struct TaskEnv {
    /// Account registry shared by all tasks.
    pub registry: Arc<AccountRegistry>,
    /// Contract client used for every submission.
    pub client: Arc<dyn ContractClient>,
    /// Transfer tunables.
    pub settings: TransferSettings,
}

impl TaskEnv {
    /// Bundles the collaborators.
    pub const fn new(
        registry: Arc<AccountRegistry>,
        client: Arc<dyn ContractClient>,
        settings: TransferSettings,
    ) -> Self {
        Self { registry, client, settings }
    }
}

/// What a task does on each iteration of its loop.
#[async_trait]
pub trait Workload: Send + Sync + fmt::Debug + 'static {
    /// Successes after which the loop ends. Zero runs until stopped.
    fn required_success(&self) -> u64 {
        0
    }

    /// Runs until [`TaskContext::should_quit`] holds.
    async fn internal_loop(&self, ctx: &TaskContext);
}

/// State visible to a running workload.
#[derive(Debug)]
pub struct TaskContext {
    name: String,
    state: AtomicU8,
    stop: Mutex<CancellationToken>,
    required_success: u64,
    counters: TaskCounters,
    env: TaskEnv,
}

impl TaskContext {
    fn new(name: String, required_success: u64, env: TaskEnv) -> Self {
        Self {
            name,
            state: AtomicU8::new(TaskState::Idle as u8),
            stop: Mutex::new(CancellationToken::new()),
            required_success,
            counters: TaskCounters::default(),
            env,
        }
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the loop must return: a stop was requested or the success target is met.
    pub fn should_quit(&self) -> bool {
        let running = self.state() == TaskState::Running;
        let target_open =
            self.required_success == 0 || self.counters.success() < self.required_success;
        !(running && target_open)
    }

    /// Token cancelled when a stop is requested for the current run.
    ///
    /// Waits that do not poll [`Self::should_quit`] race against it.
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop.lock().clone()
    }

    /// Counters of this task.
    pub const fn counters(&self) -> &TaskCounters {
        &self.counters
    }

    /// Shared collaborators.
    pub const fn env(&self) -> &TaskEnv {
        &self.env
    }

    /// Account registry.
    pub fn registry(&self) -> &AccountRegistry {
        &self.env.registry
    }

    /// Contract client.
    pub fn client(&self) -> &dyn ContractClient {
        self.env.client.as_ref()
    }

    /// Transfer tunables.
    pub const fn settings(&self) -> &TransferSettings {
        &self.env.settings
    }

    /// Sleeps for the retry backoff.
    pub async fn backoff(&self) {
        tokio::time::sleep(self.env.settings.retry_backoff).await;
    }
}

/// A named, restartable transfer workload.
pub struct TransferTask {
    ctx: Arc<TaskContext>,
    workload: Arc<dyn Workload>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("name", &self.ctx.name)
            .field("state", &self.ctx.state())
            .field("workload", &self.workload)
            .finish_non_exhaustive()
    }
}

impl TransferTask {
    /// Creates an idle task running `workload`.
    pub fn new(name: impl Into<String>, workload: impl Workload, env: TaskEnv) -> Self {
        let required_success = workload.required_success();
        Self {
            ctx: Arc::new(TaskContext::new(name.into(), required_success, env)),
            workload: Arc::new(workload),
            handle: Mutex::new(None),
        }
    }

    /// Task name.
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.ctx.state()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> TaskStats {
        self.ctx.counters.snapshot()
    }

    /// Status line data.
    pub fn status(&self) -> TaskStatus {
        TaskStatus { name: self.ctx.name.clone(), state: self.state(), stats: self.stats() }
    }

    /// Spawns the loop. Returns `false` if the task is running or still stopping.
    pub fn start(&self) -> bool {
        let mut stop = self.ctx.stop.lock();
        if !self.ctx.transition(TaskState::Idle, TaskState::Running) {
            info!(task = %self.ctx.name, state = ?self.ctx.state(), "task already running");
            return false;
        }
        *stop = CancellationToken::new();
        drop(stop);

        info!(task = %self.ctx.name, "task started");
        let ctx = Arc::clone(&self.ctx);
        let workload = Arc::clone(&self.workload);
        let handle = tokio::spawn(async move {
            workload.internal_loop(&ctx).await;
            ctx.set_state(TaskState::Idle);
            let stats = ctx.counters.snapshot();
            info!(
                task = %ctx.name,
                total = stats.total,
                success = stats.success,
                failed = stats.failed,
                "task stopped"
            );
        });

        *self.handle.lock() = Some(handle);
        true
    }

    /// Requests a cooperative stop. Returns `false` if the task is not running.
    pub fn stop(&self) -> bool {
        let stop = self.ctx.stop.lock();
        if self.ctx.transition(TaskState::Running, TaskState::StopRequested) {
            stop.cancel();
            info!(task = %self.ctx.name, "stopping task");
            true
        } else {
            info!(task = %self.ctx.name, "task is not running");
            false
        }
    }

    /// Waits for the current run to return.
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            warn!(task = %self.ctx.name, error = %err, "task loop aborted");
            self.ctx.set_state(TaskState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        test_utils::{FakeContractClient, FakeLedger, fixture_env},
        transfer::TransferResult,
    };

    #[derive(Debug)]
    struct Counting {
        required: u64,
    }

    #[async_trait]
    impl Workload for Counting {
        fn required_success(&self) -> u64 {
            self.required
        }

        async fn internal_loop(&self, ctx: &TaskContext) {
            while !ctx.should_quit() {
                ctx.counters().record(TransferResult::Success, &[]);
                tokio::task::yield_now().await;
            }
        }
    }

    fn env() -> TaskEnv {
        fixture_env(Arc::new(FakeLedger::new()), Arc::new(FakeContractClient::new()), 2)
    }

    #[tokio::test]
    async fn runs_to_required_success_then_idles() {
        let task = TransferTask::new("count", Counting { required: 3 }, env());
        assert_eq!(task.state(), TaskState::Idle);

        assert!(task.start());
        task.join().await;

        assert_eq!(task.state(), TaskState::Idle);
        assert_eq!(task.stats().success, 3);
    }

    #[tokio::test]
    async fn start_is_noop_while_running() {
        let task = TransferTask::new("forever", Counting { required: 0 }, env());
        assert!(task.start());
        assert!(!task.start());
        assert_eq!(task.state(), TaskState::Running);

        assert!(task.stop());
        assert_eq!(task.state(), TaskState::StopRequested);
        assert!(!task.start());
        assert!(!task.stop());

        task.join().await;
        assert_eq!(task.state(), TaskState::Idle);
        assert!(!task.stop());
    }

    #[tokio::test]
    async fn restart_after_stop_keeps_counting() {
        let task = TransferTask::new("again", Counting { required: 0 }, env());
        task.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        task.stop();
        task.join().await;
        let first = task.stats().success;

        task.start();
        tokio::task::yield_now().await;
        task.stop();
        task.join().await;
        assert!(task.stats().success >= first);
    }

    #[derive(Debug)]
    struct Parked;

    #[async_trait]
    impl Workload for Parked {
        async fn internal_loop(&self, ctx: &TaskContext) {
            ctx.stop_signal().cancelled().await;
        }
    }

    #[tokio::test]
    async fn stop_cancels_only_the_current_run() {
        let task = TransferTask::new("parked", Parked, env());
        task.start();
        let first = task.ctx.stop_signal();
        assert!(!first.is_cancelled());

        task.stop();
        assert!(first.is_cancelled());
        task.join().await;
        assert_eq!(task.state(), TaskState::Idle);

        task.start();
        assert!(!task.ctx.stop_signal().is_cancelled());
        task.stop();
        task.join().await;
    }

    #[test]
    fn active_states() {
        assert!(!TaskState::Idle.is_active());
        assert!(TaskState::Running.is_active());
        assert!(TaskState::StopRequested.is_active());
    }
}
