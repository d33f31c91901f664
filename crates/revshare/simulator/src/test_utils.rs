//! In-memory chain fakes shared by unit and integration tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::{
    ChainError, ChainResult, TransferSettings,
    accounts::{Account, AccountRegistry},
    chain::{BlockNotifier, ContractCall, ContractClient, Ledger, TxReceipt, TxRequest},
    config::ONE_TOKEN,
    reward::{FeeConfiguration, RewardConfig},
    transfer::TaskEnv,
};

/// In-memory [`Ledger`].
///
/// Unknown native and token balances read as the default balance.
#[derive(Debug)]
pub struct FakeLedger {
    /// Height returned by `block_number`.
    pub block: AtomicU64,
    default_balance: U256,
    balances: Mutex<HashMap<Address, U256>>,
    token_balances: Mutex<HashMap<(Address, Address), U256>>,
    symbols: Mutex<HashMap<Address, String>>,
    nonces: Mutex<HashMap<Address, u64>>,
    gas_price: AtomicU64,
    nonce_queries: AtomicUsize,
    fail_nonce_queries: AtomicBool,
    nonce_gate: Option<Semaphore>,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self {
            block: AtomicU64::new(0),
            default_balance: U256::from(1_000_000 * ONE_TOKEN),
            balances: Mutex::default(),
            token_balances: Mutex::default(),
            symbols: Mutex::default(),
            nonces: Mutex::default(),
            gas_price: AtomicU64::new(1),
            nonce_queries: AtomicUsize::new(0),
            fail_nonce_queries: AtomicBool::new(false),
            nonce_gate: None,
        }
    }
}

impl FakeLedger {
    /// Ledger where every account is rich.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the balance unknown accounts read as.
    pub fn with_default_balance(mut self, balance: U256) -> Self {
        self.default_balance = balance;
        self
    }

    /// Holds every pending nonce lookup until [`Self::release_nonce_queries`] lets it through.
    pub fn with_held_nonce_queries(mut self) -> Self {
        self.nonce_gate = Some(Semaphore::new(0));
        self
    }

    /// Lets `count` held nonce lookups complete.
    pub fn release_nonce_queries(&self, count: usize) {
        if let Some(gate) = &self.nonce_gate {
            gate.add_permits(count);
        }
    }

    /// Native balance of `address`.
    pub fn balance_of(&self, address: Address) -> U256 {
        self.balances.lock().get(&address).copied().unwrap_or(self.default_balance)
    }

    /// Sets the native balance of `address`.
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().insert(address, balance);
    }

    /// Token balance of `owner`.
    pub fn token_balance_of(&self, token: Address, owner: Address) -> U256 {
        self.token_balances.lock().get(&(token, owner)).copied().unwrap_or(self.default_balance)
    }

    /// Sets the token balance of `owner`.
    pub fn set_token_balance(&self, token: Address, owner: Address, balance: U256) {
        self.token_balances.lock().insert((token, owner), balance);
    }

    /// Sets the symbol reported for `token`.
    pub fn set_symbol(&self, token: Address, symbol: impl Into<String>) {
        self.symbols.lock().insert(token, symbol.into());
    }

    /// Sets the pending nonce of `address`.
    pub fn set_pending_nonce(&self, address: Address, nonce: u64) {
        self.nonces.lock().insert(address, nonce);
    }

    /// Advances the pending nonce of `address`.
    pub fn bump_nonce(&self, address: Address) {
        *self.nonces.lock().entry(address).or_default() += 1;
    }

    /// Sets the gas price.
    pub fn set_gas_price(&self, price: u64) {
        self.gas_price.store(price, Ordering::SeqCst);
    }

    /// Pending nonce lookups served so far.
    pub fn nonce_queries(&self) -> usize {
        self.nonce_queries.load(Ordering::SeqCst)
    }

    /// Makes pending nonce lookups fail.
    pub fn fail_nonce_queries(&self, fail: bool) {
        self.fail_nonce_queries.store(fail, Ordering::SeqCst);
    }

    fn move_native(&self, from: Address, to: Address, amount: U256) -> ChainResult<()> {
        let mut balances = self.balances.lock();
        let held = balances.get(&from).copied().unwrap_or(self.default_balance);
        let remaining = held
            .checked_sub(amount)
            .ok_or_else(|| ChainError::Rpc(format!("insufficient funds for {from}")))?;
        balances.insert(from, remaining);
        let credited = balances.get(&to).copied().unwrap_or(self.default_balance);
        balances.insert(to, credited.saturating_add(amount));
        Ok(())
    }

    fn move_token(&self, token: Address, from: Address, to: Address, amount: U256) -> ChainResult<()> {
        let mut balances = self.token_balances.lock();
        let held = balances.get(&(token, from)).copied().unwrap_or(self.default_balance);
        let remaining = held
            .checked_sub(amount)
            .ok_or_else(|| ChainError::Rpc(format!("transfer amount exceeds balance of {from}")))?;
        balances.insert((token, from), remaining);
        let credited = balances.get(&(token, to)).copied().unwrap_or(self.default_balance);
        balances.insert((token, to), credited.saturating_add(amount));
        Ok(())
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.balance_of(address))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256> {
        Ok(self.token_balance_of(token, owner))
    }

    async fn token_symbol(&self, token: Address) -> ChainResult<String> {
        Ok(self.symbols.lock().get(&token).cloned().unwrap_or_else(|| "TT".to_string()))
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<u64> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.nonce_gate {
            gate.acquire().await.map_err(|e| ChainError::Rpc(e.to_string()))?.forget();
        }
        tokio::task::yield_now().await;
        if self.fail_nonce_queries.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc("connection refused".into()));
        }
        Ok(self.nonces.lock().get(&address).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        Ok(self.gas_price.load(Ordering::SeqCst).into())
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.block.load(Ordering::SeqCst))
    }
}

/// A submission seen by [`FakeContractClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Signer address.
    pub from: Address,
    /// Submitted request.
    pub request: TxRequest,
    /// One-based submission number.
    pub attempt: u64,
    /// Whether the submission was mined successfully.
    pub ok: bool,
}

/// Scriptable [`ContractClient`] that records every submission.
///
/// With a ledger attached, successful value and token transfers move balances and advance the
/// signer's nonce.
#[derive(Debug, Default)]
pub struct FakeContractClient {
    attempts: AtomicU64,
    failing: HashSet<u64>,
    delay: Option<Duration>,
    ledger: Option<Arc<FakeLedger>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeContractClient {
    /// Client whose submissions all succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the given one-based submission numbers.
    pub fn failing_attempts(mut self, attempts: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(attempts);
        self
    }

    /// Sleeps for `delay` before each receipt.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Applies successful transfers to `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<FakeLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Submissions so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every submission in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Successful submissions in order.
    pub fn successful_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().iter().filter(|call| call.ok).cloned().collect()
    }

    fn apply(&self, from: Address, request: &TxRequest) -> ChainResult<()> {
        let Some(ledger) = &self.ledger else { return Ok(()) };
        match request {
            TxRequest::Value { to, amount } => ledger.move_native(from, *to, *amount)?,
            TxRequest::Call { contract, call: ContractCall::Transfer { to, amount } } => {
                ledger.move_token(*contract, from, *to, *amount)?
            }
            TxRequest::Call { .. } => {}
        }
        ledger.bump_nonce(from);
        Ok(())
    }
}

#[async_trait]
impl ContractClient for FakeContractClient {
    async fn submit(&self, signer: &Account, request: TxRequest) -> ChainResult<TxReceipt> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let from = signer.address();
        let outcome = if self.failing.contains(&attempt) {
            Err(ChainError::Reverted {
                method: request.method(),
                tx_hash: B256::from(U256::from(attempt)),
            })
        } else {
            self.apply(from, &request)
        };

        self.calls.lock().push(RecordedCall { from, request, attempt, ok: outcome.is_ok() });
        outcome.map(|()| TxReceipt {
            tx_hash: B256::from(U256::from(attempt)),
            block_number: self.ledger.as_ref().map(|ledger| ledger.block.load(Ordering::SeqCst)),
            gas_used: 21_000,
        })
    }
}

/// In-memory [`FeeConfiguration`].
#[derive(Debug, Clone)]
pub struct FakeFeeConfiguration {
    max_gas: U256,
    max_rewards: usize,
    configs: HashMap<Address, RewardConfig>,
}

impl Default for FakeFeeConfiguration {
    fn default() -> Self {
        Self { max_gas: U256::from(1_000_000u64), max_rewards: 5, configs: HashMap::new() }
    }
}

impl FakeFeeConfiguration {
    /// Registers `config` under its target address.
    pub fn with_config(mut self, config: RewardConfig) -> Self {
        self.configs.insert(config.address, config);
        self
    }
}

#[async_trait]
impl FeeConfiguration for FakeFeeConfiguration {
    async fn max_gas(&self) -> ChainResult<U256> {
        Ok(self.max_gas)
    }

    async fn max_rewards(&self) -> ChainResult<usize> {
        Ok(self.max_rewards)
    }

    async fn config_of(&self, target: Address) -> ChainResult<Option<RewardConfig>> {
        Ok(self.configs.get(&target).cloned())
    }
}

/// Task environment with a random deployer, `accounts` random accounts and a fixed pair seed.
///
/// Retries back off for one millisecond and nothing publishes blocks, so balance waits poll once
/// a second.
pub fn fixture_env(
    ledger: Arc<FakeLedger>,
    client: Arc<dyn ContractClient>,
    accounts: usize,
) -> TaskEnv {
    let registry =
        AccountRegistry::with_seed(Account::random(), ledger, BlockNotifier::new(0).subscribe(), 7);
    registry
        .register_accounts((0..accounts).map(|_| Account::random()))
        .expect("random accounts are distinct");
    let settings = TransferSettings::default().with_retry_backoff(Duration::from_millis(1));
    TaskEnv::new(Arc::new(registry), client, settings)
}
