use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tracing::info;

use super::{PairDraw, Tally, TaskContext, Workload};
use crate::{chain::IERC20, reward::call_signature};

/// Random peer-to-peer ERC20 transfers between registry accounts.
#[derive(Debug, Clone)]
pub struct TokenTransfer {
    token: Address,
    symbol: String,
    required_success: u64,
    steps: [B256; 1],
}

impl TokenTransfer {
    /// Transfers `token`, stopping after `required_success` transfers when non-zero.
    pub fn new(token: Address, symbol: impl Into<String>, required_success: u64) -> Self {
        Self {
            token,
            symbol: symbol.into(),
            required_success,
            steps: [call_signature::<IERC20::transferCall>()],
        }
    }

    /// Token contract.
    pub const fn token(&self) -> Address {
        self.token
    }
}

#[async_trait]
impl Workload for TokenTransfer {
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
                    ctx.transfer_token(self.token, &from, to.address(), amount)
                })
                .await;
            if sent {
                info!(
                    task = ctx.name(),
                    from = %from.address(),
                    to = %to.address(),
                    %amount,
                    symbol = %self.symbol,
                    "transferred token"
                );
            }
        }
    }
}
