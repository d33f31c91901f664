//! Fan-out funding of a contiguous slice of registry accounts from a throwaway sponsor.

use std::{ops::RangeInclusive, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{Tally, TaskContext, Workload};
use crate::{
    TaskError, TransferSettings,
    accounts::Account,
    chain::IERC20,
    reward::call_signature,
};

/// Attempts spent on returning leftover funds to the deployer.
const REFUND_ATTEMPTS: u32 = 5;

/// Inclusive range of registry indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SponsorRange {
    start: usize,
    stop: usize,
}

impl SponsorRange {
    /// Range `start..=stop`.
    pub fn new(start: usize, stop: usize) -> Result<Self, TaskError> {
        if stop < start {
            return Err(TaskError::InvalidParameter(format!(
                "sponsor range stop {stop} is before start {start}"
            )));
        }
        Ok(Self { start, stop })
    }

    /// Splits `account_count` accounts into `simulator_count` equal ranges.
    ///
    /// Accounts beyond `simulator_count * (account_count / simulator_count)` are not covered.
    pub fn partition(account_count: usize, simulator_count: usize) -> Result<Vec<Self>, TaskError> {
        if simulator_count == 0 {
            return Err(TaskError::InvalidParameter("simulator count must be positive".into()));
        }
        let per_range = account_count / simulator_count;
        if per_range == 0 {
            return Err(TaskError::InvalidParameter(format!(
                "{account_count} accounts cannot be split across {simulator_count} simulators"
            )));
        }

        Ok((0..simulator_count)
            .map(|i| {
                let start = i * per_range;
                Self { start, stop: start + per_range - 1 }
            })
            .collect())
    }

    /// First index.
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Last index.
    pub const fn stop(&self) -> usize {
        self.stop
    }

    /// Number of indices covered.
    pub const fn len(&self) -> usize {
        self.stop - self.start + 1
    }

    /// Always false; a range covers at least one index.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Limits the range to a registry of `len` accounts. `None` if nothing is left.
    pub fn clamp(&self, len: usize) -> Option<Self> {
        let last = len.checked_sub(1)?;
        let stop = self.stop.min(last);
        (stop >= self.start).then_some(Self { start: self.start, stop })
    }

    /// Indices covered.
    pub const fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.stop
    }
}

fn checked_amount(amount: U256, settings: &TransferSettings) -> Result<U256, TaskError> {
    if amount < settings.min_balance {
        return Err(TaskError::InvalidParameter(format!(
            "sponsor amount {amount} is below the minimum balance {}",
            settings.min_balance
        )));
    }
    Ok(amount)
}

/// `amount` for every index of `range` plus `reserve`, rejecting totals beyond `U256`.
fn range_total(amount: U256, range: &SponsorRange, reserve: U256) -> Result<U256, TaskError> {
    amount
        .checked_mul(U256::from(range.len()))
        .and_then(|total| total.checked_add(reserve))
        .ok_or_else(|| {
            TaskError::InvalidParameter(format!(
                "sponsoring {} accounts with {amount} each overflows",
                range.len()
            ))
        })
}

/// Brings every account in a range up to a native balance of `amount`.
#[derive(Debug, Clone)]
pub struct SponsorNative {
    range: SponsorRange,
    amount: U256,
    sponsor: Arc<Account>,
}

impl SponsorNative {
    /// Sponsors `range` from a freshly generated account.
    pub fn new(
        range: SponsorRange,
        amount: U256,
        settings: &TransferSettings,
    ) -> Result<Self, TaskError> {
        Self::with_sponsor(range, amount, settings, Account::random())
    }

    /// Sponsors `range` from `sponsor`.
    pub fn with_sponsor(
        range: SponsorRange,
        amount: U256,
        settings: &TransferSettings,
        sponsor: Account,
    ) -> Result<Self, TaskError> {
        let amount = checked_amount(amount, settings)?;
        range_total(amount, &range, settings.gas_reserve())?;
        info!(start = range.start, stop = range.stop, sponsor = %sponsor.address(), "native sponsor created");
        Ok(Self { range, amount, sponsor: Arc::new(sponsor) })
    }

    /// Throwaway account the range is funded from.
    pub fn sponsor(&self) -> &Account {
        &self.sponsor
    }
}

#[async_trait]
impl Workload for SponsorNative {
    async fn internal_loop(&self, ctx: &TaskContext) {
        let registry = ctx.registry();
        let settings = ctx.settings();
        let Some(range) = self.range.clamp(registry.len()) else {
            info!(task = ctx.name(), start = self.range.start, "sponsor range is empty");
            return;
        };

        let sponsor = self.sponsor.address();
        let required = match range_total(self.amount, &range, settings.gas_reserve()) {
            Ok(required) => required,
            Err(err) => {
                error!(task = ctx.name(), error = %err, "cannot fund sponsor");
                return;
            }
        };
        let balance = native_balance(ctx, sponsor).await;
        if balance < required {
            ctx.fund_native(sponsor, required - balance).await;
        }

        for index in range.indices() {
            if ctx.should_quit() {
                break;
            }
            let Some(account) = registry.account_at(index) else { break };
            let recipient = account.address();

            if registry.ledger().balance(recipient).await.is_ok_and(|b| b >= self.amount) {
                continue;
            }
            ctx.retry(Tally::Counted(&[]), || {
                ctx.transfer_native(&self.sponsor, recipient, self.amount)
            })
            .await;
        }

        refund_native(ctx, &self.sponsor).await;
    }
}

/// Brings every account in a range up to a `token` balance of `amount`.
#[derive(Debug, Clone)]
pub struct SponsorToken {
    token: Address,
    symbol: String,
    range: SponsorRange,
    amount: U256,
    sponsor: Arc<Account>,
    steps: [B256; 1],
}

impl SponsorToken {
    /// Sponsors `range` with `token` from a freshly generated account.
    pub fn new(
        token: Address,
        symbol: impl Into<String>,
        range: SponsorRange,
        amount: U256,
        settings: &TransferSettings,
    ) -> Result<Self, TaskError> {
        Self::with_sponsor(token, symbol, range, amount, settings, Account::random())
    }

    /// Sponsors `range` with `token` from `sponsor`.
    pub fn with_sponsor(
        token: Address,
        symbol: impl Into<String>,
        range: SponsorRange,
        amount: U256,
        settings: &TransferSettings,
        sponsor: Account,
    ) -> Result<Self, TaskError> {
        let amount = checked_amount(amount, settings)?;
        range_total(amount, &range, U256::ZERO)?;
        let symbol = symbol.into();
        info!(
            %symbol,
            start = range.start,
            stop = range.stop,
            sponsor = %sponsor.address(),
            "token sponsor created"
        );
        Ok(Self {
            token,
            symbol,
            range,
            amount,
            sponsor: Arc::new(sponsor),
            steps: [call_signature::<IERC20::transferCall>()],
        })
    }

    /// Throwaway account the range is funded from.
    pub fn sponsor(&self) -> &Account {
        &self.sponsor
    }
}

#[async_trait]
impl Workload for SponsorToken {
    async fn internal_loop(&self, ctx: &TaskContext) {
        let registry = ctx.registry();
        let settings = ctx.settings();
        let Some(range) = self.range.clamp(registry.len()) else {
            info!(task = ctx.name(), start = self.range.start, "sponsor range is empty");
            return;
        };

        let sponsor = self.sponsor.address();
        let gas = settings.gas_reserve();
        let balance = native_balance(ctx, sponsor).await;
        if balance < gas {
            ctx.fund_native(sponsor, gas - balance).await;
        }

        let required = match range_total(self.amount, &range, U256::ZERO) {
            Ok(required) => required,
            Err(err) => {
                error!(task = ctx.name(), error = %err, "cannot fund sponsor");
                return;
            }
        };
        let balance = token_balance(ctx, self.token, sponsor).await;
        if balance < required {
            ctx.fund_token(self.token, sponsor, required - balance).await;
        }

        for index in range.indices() {
            if ctx.should_quit() {
                break;
            }
            let Some(account) = registry.account_at(index) else { break };
            let recipient = account.address();

            let held = token_balance(ctx, self.token, recipient).await;
            if held >= self.amount {
                continue;
            }
            let amount = self.amount - held;
            ctx.retry(Tally::Counted(&self.steps), || {
                ctx.transfer_token(self.token, &self.sponsor, recipient, amount)
            })
            .await;
        }

        let deployer = registry.deployer().address();
        let leftover = token_balance(ctx, self.token, sponsor).await;
        if leftover > U256::ZERO {
            let refunded = ctx
                .retry_bounded(REFUND_ATTEMPTS, || {
                    ctx.transfer_token(self.token, &self.sponsor, deployer, leftover)
                })
                .await;
            if refunded {
                info!(task = ctx.name(), %sponsor, amount = %leftover, symbol = %self.symbol, "refunded token");
            } else {
                warn!(task = ctx.name(), %sponsor, amount = %leftover, symbol = %self.symbol, "token refund failed");
            }
        }

        refund_native(ctx, &self.sponsor).await;
    }
}

async fn native_balance(ctx: &TaskContext, address: Address) -> U256 {
    ctx.registry().ledger().balance(address).await.unwrap_or_else(|err| {
        warn!(task = ctx.name(), %address, error = %err, "failed to read balance");
        U256::ZERO
    })
}

async fn token_balance(ctx: &TaskContext, token: Address, address: Address) -> U256 {
    ctx.registry().ledger().token_balance(token, address).await.unwrap_or_else(|err| {
        warn!(task = ctx.name(), %token, %address, error = %err, "failed to read balance");
        U256::ZERO
    })
}

/// Returns everything above `min_balance` to the deployer.
async fn refund_native(ctx: &TaskContext, sponsor: &Account) {
    let min_balance = ctx.settings().min_balance;
    let balance = native_balance(ctx, sponsor.address()).await;
    if balance <= min_balance {
        return;
    }

    let deployer = ctx.registry().deployer().address();
    let amount = balance - min_balance;
    let refunded = ctx
        .retry_bounded(REFUND_ATTEMPTS, || ctx.transfer_native(sponsor, deployer, amount))
        .await;
    if refunded {
        info!(task = ctx.name(), sponsor = %sponsor.address(), %amount, "refunded gas");
    } else {
        warn!(task = ctx.name(), sponsor = %sponsor.address(), %amount, "gas refund failed");
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        TransferTask,
        test_utils::{FakeContractClient, FakeLedger, fixture_env},
    };

    #[rstest]
    #[case::even(2000, 40, 50)]
    #[case::uneven(10, 3, 3)]
    #[case::one_each(4, 4, 1)]
    fn partition_yields_equal_ranges(
        #[case] accounts: usize,
        #[case] simulators: usize,
        #[case] per_range: usize,
    ) {
        let ranges = SponsorRange::partition(accounts, simulators).unwrap();
        assert_eq!(ranges.len(), simulators);
        for (i, range) in ranges.iter().enumerate() {
            assert_eq!(range.start(), i * per_range);
            assert_eq!(range.len(), per_range);
        }
    }

    #[rstest]
    #[case::no_simulators(10, 0)]
    #[case::too_many_simulators(3, 4)]
    fn partition_rejects_bad_counts(#[case] accounts: usize, #[case] simulators: usize) {
        assert!(matches!(
            SponsorRange::partition(accounts, simulators),
            Err(TaskError::InvalidParameter(_))
        ));
    }

    #[test]
    fn clamp_limits_to_registry() {
        let range = SponsorRange::new(5, 9).unwrap();
        assert_eq!(range.clamp(7), Some(SponsorRange::new(5, 6).unwrap()));
        assert_eq!(range.clamp(20), Some(range));
        assert_eq!(range.clamp(5), None);
        assert_eq!(range.clamp(0), None);
        assert!(SponsorRange::new(3, 2).is_err());
    }

    #[test]
    fn amount_below_min_balance_is_rejected() {
        let settings = TransferSettings::default();
        let range = SponsorRange::new(0, 1).unwrap();
        assert!(SponsorNative::new(range, U256::from(1u64), &settings).is_err());
        assert!(SponsorNative::new(range, settings.min_balance, &settings).is_ok());
    }

    #[test]
    fn overflowing_range_total_is_rejected() {
        let settings = TransferSettings::default();
        let range = SponsorRange::new(0, 2).unwrap();
        let amount = U256::MAX / U256::from(2u64);

        let native = SponsorNative::new(range, amount, &settings);
        assert!(matches!(native, Err(TaskError::InvalidParameter(_))));
        let token = SponsorToken::new(Address::repeat_byte(0x70), "TT01", range, amount, &settings);
        assert!(matches!(token, Err(TaskError::InvalidParameter(_))));

        let single = SponsorRange::new(0, 0).unwrap();
        assert!(SponsorToken::new(Address::ZERO, "TT01", single, amount, &settings).is_ok());
        // The gas reserve alone pushes a full-width native total over.
        assert!(SponsorNative::new(single, U256::MAX, &settings).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn native_sponsor_funds_range_and_refunds() {
        let ledger = Arc::new(FakeLedger::new().with_default_balance(U256::ZERO));
        let client = Arc::new(FakeContractClient::new().with_ledger(Arc::clone(&ledger)));
        let env = fixture_env(Arc::clone(&ledger), client.clone(), 4);
        let settings = env.settings.clone();
        let deployer = env.registry.deployer().address();
        ledger.set_balance(deployer, U256::from(u128::MAX));

        let amount = settings.min_balance * U256::from(1000u64);
        let accounts = env.registry.accounts();
        // Already funded, so skipped.
        ledger.set_balance(accounts[1].address(), amount);

        let workload =
            SponsorNative::new(SponsorRange::new(0, 9).unwrap(), amount, &settings).unwrap();
        let sponsor = workload.sponsor().address();
        let task = TransferTask::new("sponsor_NATIVE_0", workload, env);
        task.start();
        task.join().await;

        for account in &accounts {
            assert_eq!(ledger.balance_of(account.address()), amount);
        }
        assert_eq!(ledger.balance_of(sponsor), settings.min_balance);
        assert_eq!(task.stats().success, 3);

        let calls = client.successful_calls();
        assert_eq!(calls.first().map(|c| c.from), Some(deployer));
        let refund = calls.last().unwrap();
        assert_eq!((refund.from, refund.request.to()), (sponsor, deployer));
    }

    #[tokio::test(start_paused = true)]
    async fn token_sponsor_tops_up_difference() {
        let token = Address::repeat_byte(0x70);
        let ledger = Arc::new(FakeLedger::new().with_default_balance(U256::ZERO));
        let client = Arc::new(FakeContractClient::new().with_ledger(Arc::clone(&ledger)));
        let env = fixture_env(Arc::clone(&ledger), client.clone(), 2);
        let settings = env.settings.clone();
        let deployer = env.registry.deployer().address();
        ledger.set_balance(deployer, U256::from(u128::MAX));
        ledger.set_token_balance(token, deployer, U256::from(u128::MAX));

        let amount = settings.min_balance * U256::from(5u64);
        let accounts = env.registry.accounts();
        ledger.set_token_balance(token, accounts[0].address(), settings.min_balance);

        let workload = SponsorToken::new(
            token,
            "TT01",
            SponsorRange::new(0, 1).unwrap(),
            amount,
            &settings,
        )
        .unwrap();
        let sponsor = workload.sponsor().address();
        let task = TransferTask::new("sponsor_TT01_0", workload, env);
        task.start();
        task.join().await;

        for account in &accounts {
            assert_eq!(ledger.token_balance_of(token, account.address()), amount);
        }
        assert_eq!(ledger.token_balance_of(token, sponsor), U256::ZERO);
        assert_eq!(ledger.balance_of(sponsor), settings.min_balance);
        assert_eq!(task.stats().success, 2);
    }
}
