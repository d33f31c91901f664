//! Lock/submit/unlock rounds and the retry loop shared by every workload.

use std::{future::Future, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use tracing::{debug, error, info, warn};

use super::{TaskContext, TransferResult};
use crate::{
    accounts::Account,
    chain::{ContractCall, TxRequest},
};

/// Result of [`TaskContext::choose_pair`].
#[derive(Debug)]
pub enum PairDraw {
    /// Distinct sender and recipient.
    Pair(Arc<Account>, Arc<Account>),
    /// Both draws hit the same account.
    Coincident,
    /// The registry cannot form a pair. The loop should end.
    Exhausted,
}

/// Whether an operation's rounds feed the task counters.
#[derive(Debug, Clone, Copy)]
pub enum Tally<'a> {
    /// Every round is counted. Successes also record these step signatures.
    Counted(&'a [B256]),
    /// Funding and refund traffic.
    Uncounted,
}

impl TaskContext {
    /// One round: take the sender's nonce lock, submit, release.
    pub async fn submit(&self, signer: &Account, request: TxRequest) -> TransferResult {
        let Some(guard) = self.registry().lock_nonce(signer.address()).await else {
            return TransferResult::NonceBlocked;
        };

        let method = request.method();
        let to = request.to();
        let result = match self.client().submit(signer, request).await {
            Ok(receipt) => {
                debug!(
                    task = self.name(),
                    method,
                    from = %signer.address(),
                    %to,
                    nonce = guard.nonce(),
                    tx_hash = %receipt.tx_hash,
                    "transaction mined"
                );
                TransferResult::Success
            }
            Err(err) => {
                warn!(
                    task = self.name(),
                    method,
                    from = %signer.address(),
                    %to,
                    error = %err,
                    "transaction failed"
                );
                TransferResult::Failed
            }
        };
        drop(guard);
        result
    }

    /// Approves `proxy` for `amount` of `token`, then has the proxy forward it to `to`.
    ///
    /// Each phase takes its own nonce lock. A failed or blocked approval skips the forward.
    pub async fn submit_proxy_transfer(
        &self,
        signer: &Account,
        token: Address,
        proxy: Address,
        to: Address,
        amount: U256,
    ) -> TransferResult {
        let approve = ContractCall::Approve { spender: proxy, amount };
        match self.submit(signer, TxRequest::call(token, approve)).await {
            TransferResult::Success => {}
            other => return other,
        }

        let forward = ContractCall::ProxyTransfer { to, amount };
        self.submit(signer, TxRequest::call(proxy, forward)).await
    }

    /// Repeats `op` until it succeeds or the task must quit. Returns whether it succeeded.
    ///
    /// Blocked rounds retry immediately. Failed rounds wait for the retry backoff.
    pub async fn retry<F, Fut>(&self, tally: Tally<'_>, mut op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TransferResult>,
    {
        while !self.should_quit() {
            let result = op().await;
            if let Tally::Counted(steps) = tally {
                self.counters().record(result, steps);
            }
            match result {
                TransferResult::Success => return true,
                TransferResult::NonceBlocked => tokio::task::yield_now().await,
                TransferResult::Failed => self.backoff().await,
            }
        }
        false
    }

    /// Like [`Self::retry`] but bounded by `attempts` and independent of the stop flag.
    pub async fn retry_bounded<F, Fut>(&self, attempts: u32, mut op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TransferResult>,
    {
        let mut failures = 0;
        while failures < attempts {
            match op().await {
                TransferResult::Success => return true,
                TransferResult::NonceBlocked => tokio::task::yield_now().await,
                TransferResult::Failed => {
                    failures += 1;
                    if failures < attempts {
                        self.backoff().await;
                    }
                }
            }
        }
        false
    }

    /// Native transfer of `amount` from `from` to `to`.
    pub async fn transfer_native(&self, from: &Account, to: Address, amount: U256) -> TransferResult {
        self.submit(from, TxRequest::value(to, amount)).await
    }

    /// ERC20 transfer of `amount` of `token` from `from` to `to`.
    pub async fn transfer_token(
        &self,
        token: Address,
        from: &Account,
        to: Address,
        amount: U256,
    ) -> TransferResult {
        self.submit(from, TxRequest::call(token, ContractCall::Transfer { to, amount })).await
    }

    /// Sends `amount` of native token from `sponsor` to `to` once `sponsor` can cover it.
    ///
    /// Gives up when the task is stopped while waiting for `sponsor` to be funded.
    pub async fn fund_native_from(&self, sponsor: &Account, to: Address, amount: U256) -> bool {
        let stop = self.stop_signal();
        let funded = self
            .retry(Tally::Uncounted, || async {
                let balance = self
                    .registry()
                    .wait_until_balance_at_least(sponsor.address(), amount, &stop)
                    .await;
                if balance.is_none() {
                    return TransferResult::Failed;
                }
                self.transfer_native(sponsor, to, amount).await
            })
            .await;
        if funded {
            info!(task = self.name(), %to, %amount, "sponsored gas");
        }
        funded
    }

    /// Sends `amount` of `token` from `sponsor` to `to` once `sponsor` can cover it.
    pub async fn fund_token_from(
        &self,
        token: Address,
        sponsor: &Account,
        to: Address,
        amount: U256,
    ) -> bool {
        let stop = self.stop_signal();
        let funded = self
            .retry(Tally::Uncounted, || async {
                let balance = self
                    .registry()
                    .wait_until_token_balance_at_least(token, sponsor.address(), amount, &stop)
                    .await;
                if balance.is_none() {
                    return TransferResult::Failed;
                }
                self.transfer_token(token, sponsor, to, amount).await
            })
            .await;
        if funded {
            info!(task = self.name(), %token, %to, %amount, "sponsored token");
        }
        funded
    }

    /// Native funding from the deployer.
    pub async fn fund_native(&self, to: Address, amount: U256) -> bool {
        let deployer = self.registry().deployer();
        self.fund_native_from(&deployer, to, amount).await
    }

    /// Token funding from the deployer.
    pub async fn fund_token(&self, token: Address, to: Address, amount: U256) -> bool {
        let deployer = self.registry().deployer();
        self.fund_token_from(token, &deployer, to, amount).await
    }

    /// Tops `account` up with `sponsor_amount` of gas when it is below `min_balance`.
    pub async fn top_up_gas(&self, account: Address) {
        let settings = self.settings();
        match self.registry().ledger().balance(account).await {
            Ok(balance) if balance < settings.min_balance => {
                self.fund_native(account, settings.sponsor_amount).await;
            }
            Ok(_) => {}
            Err(err) => warn!(task = self.name(), %account, error = %err, "failed to read balance"),
        }
    }

    /// Tops `account` up with `sponsor_amount` of `token` when it is below `min_balance`.
    pub async fn top_up_token(&self, token: Address, account: Address) {
        let settings = self.settings();
        match self.registry().ledger().token_balance(token, account).await {
            Ok(balance) if balance < settings.min_balance => {
                self.fund_token(token, account, settings.sponsor_amount).await;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(task = self.name(), %token, %account, error = %err, "failed to read balance")
            }
        }
    }

    /// Draws a sender/recipient pair. Coincident draws yield before returning.
    pub async fn choose_pair(&self) -> PairDraw {
        match self.registry().choose_pair() {
            Ok(Some((from, to))) => PairDraw::Pair(from, to),
            Ok(None) => {
                debug!(task = self.name(), "drew the same account twice");
                tokio::task::yield_now().await;
                PairDraw::Coincident
            }
            Err(err) => {
                error!(task = self.name(), error = %err, "cannot choose an account pair");
                PairDraw::Exhausted
            }
        }
    }
}
