use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tracing::info;

use super::{PairDraw, Tally, TaskContext, Workload};
use crate::{
    chain::{IERC20, ITokenTransferProxy},
    reward::call_signature,
};

/// Two-phase ERC20 transfers through a forwarding proxy: `approve` then `proxyTransfer`.
#[derive(Debug, Clone)]
pub struct ProxyTransfer {
    token: Address,
    proxy: Address,
    symbol: String,
    required_success: u64,
    steps: [B256; 2],
}

impl ProxyTransfer {
    /// Moves `token` through `proxy`, stopping after `required_success` transfers when non-zero.
    pub fn new(
        token: Address,
        proxy: Address,
        symbol: impl Into<String>,
        required_success: u64,
    ) -> Self {
        Self {
            token,
            proxy,
            symbol: symbol.into(),
            required_success,
            steps: [
                call_signature::<IERC20::approveCall>(),
                call_signature::<ITokenTransferProxy::proxyTransferCall>(),
            ],
        }
    }
}

#[async_trait]
impl Workload for ProxyTransfer {
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
            ctx.top_up_token(self.token, from.address()).await;

            let sent = ctx
                .retry(Tally::Counted(&self.steps), || {
                    ctx.submit_proxy_transfer(&from, self.token, self.proxy, to.address(), amount)
                })
                .await;
            if sent {
                info!(
                    task = ctx.name(),
                    from = %from.address(),
                    to = %to.address(),
                    %amount,
                    symbol = %self.symbol,
                    "proxy transferred token"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::address;

    use super::*;
    use crate::{
        TransferTask,
        chain::{ContractCall, TxRequest},
        test_utils::{FakeContractClient, FakeLedger, fixture_env},
    };

    const TOKEN: Address = address!("7070707070707070707070707070707070707070");
    const PROXY: Address = address!("7171717171717171717171717171717171717171");

    #[tokio::test(start_paused = true)]
    async fn approves_then_forwards() {
        let client = Arc::new(FakeContractClient::new());
        let env = fixture_env(Arc::new(FakeLedger::new()), client.clone(), 2);
        let amount = env.settings.min_transfer_amount;

        let task = TransferTask::new(
            "proxy_transfer_TT01_0",
            ProxyTransfer::new(TOKEN, PROXY, "TT01", 1),
            env,
        );
        task.start();
        task.join().await;

        let calls = client.successful_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].request,
            TxRequest::call(TOKEN, ContractCall::Approve { spender: PROXY, amount })
        );
        let TxRequest::Call { contract, call: ContractCall::ProxyTransfer { to, amount: sent } } =
            calls[1].request.clone()
        else {
            panic!("expected proxyTransfer, got {:?}", calls[1].request);
        };
        assert_eq!(contract, PROXY);
        assert_eq!(sent, amount);
        assert_ne!(to, calls[1].from);

        let stats = task.stats();
        assert_eq!(stats.success, 1);
        assert_eq!(stats.steps.len(), 2);
        assert!(stats.steps.values().all(|count| *count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_approval_skips_forward() {
        let client = Arc::new(FakeContractClient::new().failing_attempts([1]));
        let env = fixture_env(Arc::new(FakeLedger::new()), client.clone(), 2);

        let task = TransferTask::new(
            "proxy_transfer_TT01_0",
            ProxyTransfer::new(TOKEN, PROXY, "TT01", 1),
            env,
        );
        task.start();
        task.join().await;

        let methods: Vec<_> = client.calls().iter().map(|c| (c.request.method(), c.ok)).collect();
        assert_eq!(methods, [("approve", false), ("approve", true), ("proxyTransfer", true)]);
        let stats = task.stats();
        assert_eq!((stats.total, stats.success, stats.failed), (2, 1, 1));
        assert_eq!(stats.steps.get(&call_signature::<IERC20::approveCall>()), Some(&1));
        assert_eq!(stats.collisions(), 0);
    }
}
