use std::{fmt, sync::Arc};

use alloy_primitives::U256;
use futures::future::join_all;
use tracing::info;

use crate::{
    CommandError, SimulatorError, SimulatorResult,
    accounts::AccountRegistry,
    reward::RewardRule,
    settlement::{PriceScope, SettlementLedger, SettlementLine},
    transfer::{TaskEnv, TaskStats, TaskStatus, TransferTask, Workload},
};

/// Owns the named tasks and the settlement ledger.
#[derive(Debug)]
pub struct Simulator {
    env: TaskEnv,
    tasks: Vec<TransferTask>,
    settlement: SettlementLedger,
}

impl Simulator {
    /// Creates an empty simulator whose tasks share `env`.
    pub fn new(env: TaskEnv) -> Self {
        Self { env, tasks: Vec::new(), settlement: SettlementLedger::new() }
    }

    /// Shared account registry.
    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.env.registry
    }

    /// Shared task collaborators.
    pub const fn env(&self) -> &TaskEnv {
        &self.env
    }

    /// Registers `workload` under `name`, bound to the shared registry.
    pub fn add_task(&mut self, name: impl Into<String>, workload: impl Workload) -> SimulatorResult<()> {
        let name = name.into();
        if self.task(&name).is_some() {
            return Err(SimulatorError::DuplicateTask(name));
        }
        self.tasks.push(TransferTask::new(name, workload, self.env.clone()));
        Ok(())
    }

    /// Task named `name`.
    pub fn task(&self, name: &str) -> Option<&TransferTask> {
        self.tasks.iter().find(|task| task.name() == name)
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> &[TransferTask] {
        &self.tasks
    }

    fn named(&self, name: &str) -> Result<&TransferTask, CommandError> {
        self.task(name).ok_or_else(|| CommandError::InvalidInput(format!("unknown task {name}")))
    }

    /// Starts `name`. Returns whether it was started.
    pub fn start_task(&self, name: &str) -> Result<bool, CommandError> {
        Ok(self.named(name)?.start())
    }

    /// Requests `name` to stop. Returns whether a stop was requested.
    pub fn stop_task(&self, name: &str) -> Result<bool, CommandError> {
        Ok(self.named(name)?.stop())
    }

    /// Starts every idle task. Returns how many were started.
    pub fn start_all(&self) -> usize {
        self.tasks.iter().filter(|task| task.start()).count()
    }

    /// Requests every running task to stop. Returns how many were asked.
    pub fn stop_all(&self) -> usize {
        self.tasks.iter().filter(|task| task.stop()).count()
    }

    /// Tasks that are running or stopping.
    pub fn running_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.state().is_active()).count()
    }

    /// Counters of all tasks combined.
    pub fn total_stats(&self) -> TaskStats {
        self.tasks.iter().fold(TaskStats::default(), |mut total, task| {
            total.merge(&task.stats());
            total
        })
    }

    /// Waits until every task's current run has returned.
    pub async fn wait_idle(&self) {
        join_all(self.tasks.iter().map(|task| task.join())).await;
    }

    /// Records `rule`'s payouts for settlement at the current gas price.
    pub async fn observe_rule(&mut self, rule: &RewardRule, scope: PriceScope) -> SimulatorResult<()> {
        let ledger = Arc::clone(self.env.registry.ledger());
        let gas_price = U256::from(ledger.gas_price().await?);
        self.settlement.observe(ledger.as_ref(), rule, gas_price, scope).await?;
        info!(
            signature = %rule.signature,
            beneficiaries = rule.rewards.len(),
            %gas_price,
            ?scope,
            "observing reward rule"
        );
        Ok(())
    }

    /// Settlement ledger.
    pub const fn settlement_ledger(&self) -> &SettlementLedger {
        &self.settlement
    }

    /// Compares expected and actual payouts for every observed beneficiary.
    pub async fn settlement(&self) -> SimulatorResult<Vec<SettlementLine>> {
        let stats = self.total_stats();
        Ok(self.settlement.settle(self.env.registry.ledger().as_ref(), &stats).await?)
    }

    /// Status of every task, plus settlement when none is running.
    pub async fn show_status(&self) -> SimulatorResult<StatusReport> {
        let tasks: Vec<_> = self.tasks.iter().map(TransferTask::status).collect();
        let running = tasks.iter().filter(|status| status.is_active()).count();
        let settlement = if running == 0 { Some(self.settlement().await?) } else { None };
        Ok(StatusReport { tasks, running, settlement })
    }
}

/// Output of `show status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// One status per task in registration order.
    pub tasks: Vec<TaskStatus>,
    /// Tasks running or stopping.
    pub running: usize,
    /// Settlement lines, present only when no task was running.
    pub settlement: Option<Vec<SettlementLine>>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for status in &self.tasks {
            writeln!(f, "{status}")?;
        }
        write!(f, "There are {} tasks running", self.running)?;
        for line in self.settlement.iter().flatten() {
            write!(f, "\nRevenue sharing: {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Address, B256};

    use super::*;
    use crate::{
        reward::Reward,
        test_utils::{FakeContractClient, FakeLedger, fixture_env},
        transfer::{NativeTransfer, TaskState},
    };

    fn simulator(ledger: Arc<FakeLedger>) -> Simulator {
        Simulator::new(fixture_env(ledger, Arc::new(FakeContractClient::new()), 3))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut sim = simulator(Arc::new(FakeLedger::new()));
        sim.add_task("transfer_NATIVE_0", NativeTransfer::new(1)).unwrap();
        assert!(matches!(
            sim.add_task("transfer_NATIVE_0", NativeTransfer::new(1)),
            Err(SimulatorError::DuplicateTask(name)) if name == "transfer_NATIVE_0"
        ));
        assert_eq!(sim.tasks().len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_invalid_input() {
        let sim = simulator(Arc::new(FakeLedger::new()));
        assert_eq!(
            sim.start_task("nope"),
            Err(CommandError::InvalidInput("unknown task nope".into()))
        );
        assert!(sim.stop_task("nope").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn settlement_is_withheld_while_tasks_run() {
        let mut sim = simulator(Arc::new(FakeLedger::new()));
        sim.add_task("transfer_NATIVE_0", NativeTransfer::new(0)).unwrap();
        sim.add_task("transfer_NATIVE_1", NativeTransfer::new(2)).unwrap();

        assert_eq!(sim.start_all(), 2);
        let report = sim.show_status().await.unwrap();
        assert!(report.running >= 1);
        assert_eq!(report.settlement, None);

        assert!(sim.stop_task("transfer_NATIVE_0").unwrap());
        sim.wait_idle().await;
        assert!(sim.tasks().iter().all(|t| t.state() == TaskState::Idle));

        let report = sim.show_status().await.unwrap();
        assert_eq!(report.running, 0);
        assert_eq!(report.settlement, Some(vec![]));
        assert_eq!(sim.task("transfer_NATIVE_1").unwrap().stats().success, 2);
        assert!(report.to_string().contains("There are 0 tasks running"));
    }

    #[tokio::test]
    async fn observed_rule_feeds_settlement() {
        let ledger = Arc::new(FakeLedger::new());
        ledger.set_gas_price(3);
        let beneficiary = Address::repeat_byte(0xbe);
        ledger.set_balance(beneficiary, U256::from(10u64));
        let mut sim = simulator(Arc::clone(&ledger));

        let rule = RewardRule {
            signature: B256::ZERO,
            gas: U256::from(100u64),
            rewards: vec![Reward { address: beneficiary, percentage: 10_000 }],
        };
        sim.observe_rule(&rule, PriceScope::PerOperation).await.unwrap();

        let lines = sim.settlement().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].expected, U256::ZERO);
        assert!(lines[0].is_equal());
    }
}
