use async_trait::async_trait;
use tracing::info;

use super::{PairDraw, Tally, TaskContext, Workload};

/// Random peer-to-peer native transfers between registry accounts.
#[derive(Debug, Clone, Copy)]
pub struct NativeTransfer {
    required_success: u64,
}

impl NativeTransfer {
    /// Stops after `required_success` transfers, or runs until stopped when zero.
    pub const fn new(required_success: u64) -> Self {
        Self { required_success }
    }
}

#[async_trait]
impl Workload for NativeTransfer {
    fn required_success(&self) -> u64 {
        self.required_success
    }

    async fn internal_loop(&self, ctx: &TaskContext) {
        let amount = ctx.settings().min_transfer_amount;

        while !ctx.should_quit() {
            let (from, to) = match ctx.choose_pair().await {
                PairDraw::Pair(from, to) => (from, to),
                PairDraw::Coincident => continue,
                PairDraw::Exhausted => return,
            };

            ctx.top_up_gas(from.address()).await;

            let sent = ctx
                .retry(Tally::Counted(&[]), || ctx.transfer_native(&from, to.address(), amount))
                .await;
            if sent {
                info!(
                    task = ctx.name(),
                    from = %from.address(),
                    to = %to.address(),
                    %amount,
                    "transferred NATIVE"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use alloy_primitives::U256;

    use super::*;
    use crate::{
        TransferTask,
        chain::TxRequest,
        transfer::TaskState,
        test_utils::{FakeContractClient, FakeLedger, fixture_env},
    };

    #[tokio::test(start_paused = true)]
    async fn transfers_min_amount_between_distinct_accounts() {
        let ledger = Arc::new(FakeLedger::new());
        let client = Arc::new(FakeContractClient::new());
        let env = fixture_env(ledger, client.clone(), 3);
        let amount = env.settings.min_transfer_amount;

        let task = TransferTask::new("transfer_NATIVE_0", NativeTransfer::new(4), env);
        task.start();
        task.join().await;

        let calls = client.successful_calls();
        assert_eq!(calls.len(), 4);
        for call in calls {
            let TxRequest::Value { to, amount: sent } = call.request else {
                panic!("unexpected request {:?}", call.request);
            };
            assert_ne!(call.from, to);
            assert_eq!(sent, amount);
        }
        assert_eq!(task.stats().success, 4);
        assert!(task.stats().steps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn low_balance_sender_is_topped_up_first() {
        let ledger = Arc::new(FakeLedger::new().with_default_balance(U256::ZERO));
        let client = Arc::new(FakeContractClient::new().with_ledger(Arc::clone(&ledger)));
        let env = fixture_env(Arc::clone(&ledger), client.clone(), 2);
        let deployer = env.registry.deployer().address();
        ledger.set_balance(deployer, U256::MAX);

        let task = TransferTask::new("transfer_NATIVE_0", NativeTransfer::new(1), env.clone());
        task.start();
        task.join().await;

        let calls = client.successful_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].from, deployer);
        assert_eq!(calls[0].request.amount(), env.settings.sponsor_amount);
        assert_eq!(calls[1].request.amount(), env.settings.min_transfer_amount);
        assert_eq!(task.stats().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_honored_while_deployer_is_underfunded() {
        let ledger = Arc::new(FakeLedger::new().with_default_balance(U256::ZERO));
        let client = Arc::new(FakeContractClient::new().with_ledger(Arc::clone(&ledger)));
        let env = fixture_env(ledger, client.clone(), 2);

        let task = TransferTask::new("transfer_NATIVE_0", NativeTransfer::new(0), env);
        task.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(task.state(), TaskState::Running);
        assert!(client.calls().is_empty());

        assert!(task.stop());
        tokio::time::timeout(Duration::from_secs(1), task.join())
            .await
            .expect("stop ends the funding wait");
        assert_eq!(task.state(), TaskState::Idle);
        assert!(client.calls().is_empty());
        assert_eq!(task.stats().total, 0);
    }
}
