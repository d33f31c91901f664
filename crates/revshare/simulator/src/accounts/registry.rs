use std::{fmt, sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Account, NonceGuard,
    nonce::{NonceLock, UNSET},
};
use crate::{RegistryError, chain::Ledger};

/// Re-check interval used when the block notifier has shut down.
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shared set of simulation accounts plus the per-address nonce locks.
pub struct AccountRegistry {
    deployer: Arc<Account>,
    accounts: RwLock<Vec<Arc<Account>>>,
    nonces: DashMap<Address, Arc<NonceLock>>,
    ledger: Arc<dyn Ledger>,
    blocks: watch::Receiver<u64>,
    rng: Mutex<ChaCha8Rng>,
}

impl fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("deployer", &self.deployer.address())
            .field("accounts", &self.len())
            .field("locks", &self.nonces.len())
            .finish_non_exhaustive()
    }
}

impl AccountRegistry {
    /// Creates an empty registry funded by `deployer`, drawing from an entropy-seeded source.
    pub fn new(deployer: Account, ledger: Arc<dyn Ledger>, blocks: watch::Receiver<u64>) -> Self {
        let rng = ChaCha8Rng::from_rng(&mut rand::rng());
        Self::with_rng(deployer, ledger, blocks, rng)
    }

    /// Creates an empty registry whose account draws are reproducible from `seed`.
    pub fn with_seed(
        deployer: Account,
        ledger: Arc<dyn Ledger>,
        blocks: watch::Receiver<u64>,
        seed: u64,
    ) -> Self {
        Self::with_rng(deployer, ledger, blocks, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(
        deployer: Account,
        ledger: Arc<dyn Ledger>,
        blocks: watch::Receiver<u64>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            deployer: Arc::new(deployer),
            accounts: RwLock::new(Vec::new()),
            nonces: DashMap::new(),
            ledger,
            blocks,
            rng: Mutex::new(rng),
        }
    }

    /// Adds `accounts`, skipping ones already present with the same key.
    ///
    /// Nothing is inserted if any address is already registered with a different key.
    pub fn register_accounts(
        &self,
        accounts: impl IntoIterator<Item = Account>,
    ) -> Result<usize, RegistryError> {
        let mut current = self.accounts.write();
        let mut staged: Vec<Arc<Account>> = Vec::new();

        for account in accounts {
            let existing = current
                .iter()
                .chain(staged.iter())
                .find(|known| known.address() == account.address());
            match existing {
                Some(known) if known.same_key(&account) => continue,
                Some(_) => return Err(RegistryError::DuplicateAddress(account.address())),
                None => staged.push(Arc::new(account)),
            }
        }

        let added = staged.len();
        current.extend(staged);
        info!(added, total = current.len(), "registered accounts");
        Ok(added)
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// Whether no account is registered.
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// Snapshot of all registered accounts in registration order.
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        self.accounts.read().clone()
    }

    /// Account at registration index `index`.
    pub fn account_at(&self, index: usize) -> Option<Arc<Account>> {
        self.accounts.read().get(index).cloned()
    }

    /// Primary funding account.
    pub fn deployer(&self) -> Arc<Account> {
        Arc::clone(&self.deployer)
    }

    /// Ledger shared by every task.
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Uniformly random account.
    pub fn choose_account(&self) -> Result<Arc<Account>, RegistryError> {
        let accounts = self.accounts.read();
        if accounts.is_empty() {
            return Err(RegistryError::Empty);
        }
        let index = self.rng.lock().random_range(0..accounts.len());
        Ok(Arc::clone(&accounts[index]))
    }

    /// Draws two independent random accounts. Returns `None` when both draws coincide.
    pub fn choose_pair(&self) -> Result<Option<(Arc<Account>, Arc<Account>)>, RegistryError> {
        let accounts = self.accounts.read();
        match accounts.len() {
            0 => return Err(RegistryError::Empty),
            1 => return Err(RegistryError::Insufficient { required: 2, available: 1 }),
            _ => {}
        }

        let (first, second) = {
            let mut rng = self.rng.lock();
            (rng.random_range(0..accounts.len()), rng.random_range(0..accounts.len()))
        };
        if first == second {
            return Ok(None);
        }
        Ok(Some((Arc::clone(&accounts[first]), Arc::clone(&accounts[second]))))
    }

    fn nonce_lock(&self, address: Address) -> Arc<NonceLock> {
        Arc::clone(self.nonces.entry(address).or_default().value())
    }

    async fn acquire(&self, address: Address) -> Option<u64> {
        let lock = self.nonce_lock(address);
        if lock.is_busy() {
            return None;
        }

        let _gate = lock.gate().lock().await;
        let pending = match self.ledger.pending_nonce(address).await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!(%address, error = %err, "failed to read pending nonce");
                return None;
            }
        };
        let Ok(observed) = i64::try_from(pending) else {
            warn!(%address, pending, "pending nonce out of range");
            return None;
        };

        if lock.cached() == observed {
            debug!(%address, nonce = pending, "pending nonce unchanged, lock refused");
            return None;
        }
        lock.set_cached(observed);
        Some(pending)
    }

    /// Claims transaction issuance for `address`.
    ///
    /// Returns `false` without touching the chain while another transaction is in flight,
    /// and `false` when the pending nonce has not moved since the last grant. Ledger errors
    /// are logged and refuse the lock. A `true` result must be followed by
    /// [`Self::unlock_nonce`].
    pub async fn try_lock_nonce(&self, address: Address) -> bool {
        self.acquire(address).await.is_some()
    }

    /// Releases the lock taken by [`Self::try_lock_nonce`].
    pub fn unlock_nonce(&self, address: Address) {
        if let Some(lock) = self.nonces.get(&address) {
            lock.reset();
        }
    }

    /// Guarded form of [`Self::try_lock_nonce`]. The lock is released when the guard drops.
    pub async fn lock_nonce(&self, address: Address) -> Option<NonceGuard<'_>> {
        let nonce = self.acquire(address).await?;
        Some(NonceGuard::new(self, address, nonce))
    }

    /// Whether a transaction is in flight for `address`.
    pub fn is_nonce_locked(&self, address: Address) -> bool {
        self.nonces.get(&address).is_some_and(|lock| lock.cached() != UNSET)
    }

    /// Suspends until the native balance of `address` reaches `threshold`.
    ///
    /// Re-checks on every new block. Returns the satisfying balance, or `None` once `stop`
    /// fires.
    pub async fn wait_until_balance_at_least(
        &self,
        address: Address,
        threshold: U256,
        stop: &CancellationToken,
    ) -> Option<U256> {
        self.wait_for_balance(None, address, threshold, stop).await
    }

    /// Suspends until the `token` balance of `address` reaches `threshold`, or `stop` fires.
    pub async fn wait_until_token_balance_at_least(
        &self,
        token: Address,
        address: Address,
        threshold: U256,
        stop: &CancellationToken,
    ) -> Option<U256> {
        self.wait_for_balance(Some(token), address, threshold, stop).await
    }

    async fn read_balance(&self, token: Option<Address>, address: Address) -> Option<U256> {
        let balance = match token {
            None => self.ledger.balance(address).await,
            Some(token) => self.ledger.token_balance(token, address).await,
        };
        balance.inspect_err(|err| warn!(%address, error = %err, "failed to read balance")).ok()
    }

    async fn wait_for_balance(
        &self,
        token: Option<Address>,
        address: Address,
        threshold: U256,
        stop: &CancellationToken,
    ) -> Option<U256> {
        let mut blocks = self.blocks.clone();
        let mut symbol: Option<String> = None;

        while !stop.is_cancelled() {
            if let Some(balance) = self.read_balance(token, address).await {
                if balance >= threshold {
                    return Some(balance);
                }
                if symbol.is_none() {
                    symbol = Some(match token {
                        None => "NATIVE".to_string(),
                        Some(token) => self.ledger.token_symbol(token).await.unwrap_or_default(),
                    });
                }
                info!(
                    %address,
                    %balance,
                    %threshold,
                    symbol = symbol.as_deref().unwrap_or_default(),
                    "insufficient balance, waiting for deposit"
                );
            }

            let next_block = async {
                if blocks.changed().await.is_err() {
                    tokio::time::sleep(FALLBACK_POLL_INTERVAL).await;
                }
            };
            tokio::select! {
                _ = stop.cancelled() => break,
                () = next_block => {}
            }
        }

        debug!(%address, %threshold, "balance wait abandoned");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{chain::BlockNotifier, test_utils::FakeLedger};

    fn registry_with(ledger: Arc<FakeLedger>, seed: u64) -> AccountRegistry {
        AccountRegistry::with_seed(Account::random(), ledger, BlockNotifier::new(0).subscribe(), seed)
    }

    fn registry(accounts: usize) -> (Arc<FakeLedger>, AccountRegistry) {
        let ledger = Arc::new(FakeLedger::new());
        let registry = registry_with(Arc::clone(&ledger), 7);
        registry.register_accounts((0..accounts).map(|_| Account::random())).unwrap();
        (ledger, registry)
    }

    #[test]
    fn register_is_idempotent() {
        let (_, registry) = registry(0);
        let account = Account::random();
        assert_eq!(registry.register_accounts([account.clone()]).unwrap(), 1);
        assert_eq!(registry.register_accounts([account.clone(), account]).unwrap(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_keeps_registration_order() {
        let (_, registry) = registry(0);
        let accounts: Vec<_> = (0..3).map(|_| Account::random()).collect();
        registry.register_accounts(accounts.clone()).unwrap();

        let registered: Vec<_> = registry.accounts().iter().map(|a| a.address()).collect();
        let expected: Vec<_> = accounts.iter().map(Account::address).collect();
        assert_eq!(registered, expected);
        assert_eq!(registry.account_at(3), None);
    }

    #[test]
    fn empty_registry_is_exhausted() {
        let (_, registry) = registry(0);
        assert!(matches!(registry.choose_account(), Err(RegistryError::Empty)));
        assert!(matches!(registry.choose_pair(), Err(RegistryError::Empty)));
    }

    #[test]
    fn single_account_cannot_form_pair() {
        let (_, registry) = registry(1);
        assert!(registry.choose_account().is_ok());
        assert!(matches!(
            registry.choose_pair(),
            Err(RegistryError::Insufficient { required: 2, available: 1 })
        ));
    }

    #[test]
    fn pairs_never_repeat_an_account() {
        let (_, registry) = registry(4);
        let mut empty = 0;
        for _ in 0..4000 {
            match registry.choose_pair().unwrap() {
                Some((from, to)) => assert_ne!(from.address(), to.address()),
                None => empty += 1,
            }
        }
        // Expected 1000 coincident draws for four accounts.
        assert!((800..1200).contains(&empty), "empty draws: {empty}");
    }

    #[tokio::test]
    async fn second_lock_is_refused_without_querying_chain() {
        let (ledger, registry) = registry(1);
        let address = registry.account_at(0).unwrap().address();

        assert!(registry.try_lock_nonce(address).await);
        assert!(registry.is_nonce_locked(address));
        assert!(!registry.try_lock_nonce(address).await);
        assert_eq!(ledger.nonce_queries(), 1);

        registry.unlock_nonce(address);
        assert!(!registry.is_nonce_locked(address));
        assert!(registry.try_lock_nonce(address).await);
        assert_eq!(ledger.nonce_queries(), 2);
    }

    #[tokio::test]
    async fn ledger_error_refuses_lock() {
        let (ledger, registry) = registry(1);
        let address = registry.account_at(0).unwrap().address();

        ledger.fail_nonce_queries(true);
        assert!(!registry.try_lock_nonce(address).await);
        assert!(!registry.is_nonce_locked(address));

        ledger.fail_nonce_queries(false);
        assert!(registry.try_lock_nonce(address).await);
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let (_, registry) = registry(1);
        let address = registry.account_at(0).unwrap().address();

        {
            let guard = registry.lock_nonce(address).await.expect("lock granted");
            assert_eq!(guard.address(), address);
            assert_eq!(guard.nonce(), 0);
            assert!(registry.lock_nonce(address).await.is_none());
        }
        assert!(registry.lock_nonce(address).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_get_one_lock() {
        let (ledger, registry) = registry(1);
        let registry = Arc::new(registry);
        let address = registry.account_at(0).unwrap().address();
        ledger.set_pending_nonce(address, 9);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.try_lock_nonce(address).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unrelated_accounts_lock_independently() {
        let (_, registry) = registry(8);
        let registry = Arc::new(registry);

        let handles: Vec<_> = registry
            .accounts()
            .into_iter()
            .map(|account| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.try_lock_nonce(account.address()).await })
            })
            .collect();

        let mut locked = HashSet::new();
        for (index, handle) in handles.into_iter().enumerate() {
            assert!(handle.await.unwrap());
            locked.insert(index);
        }
        assert_eq!(locked.len(), 8);
    }

    #[tokio::test]
    async fn balance_wait_returns_immediately_when_satisfied() {
        let (ledger, registry) = registry(1);
        let address = registry.account_at(0).unwrap().address();
        ledger.set_balance(address, U256::from(10u64));

        let stop = CancellationToken::new();
        let balance = registry.wait_until_balance_at_least(address, U256::from(5u64), &stop).await;
        assert_eq!(balance, Some(U256::from(10u64)));
    }

    #[tokio::test]
    async fn balance_wait_resumes_on_new_block() {
        let ledger = Arc::new(FakeLedger::new());
        let notifier = BlockNotifier::new(0);
        let registry = Arc::new(AccountRegistry::with_seed(
            Account::random(),
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            notifier.subscribe(),
            1,
        ));
        let token = Address::repeat_byte(0xaa);
        let owner = Address::repeat_byte(0x01);
        ledger.set_token_balance(token, owner, U256::ZERO);

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let stop = CancellationToken::new();
                registry.wait_until_token_balance_at_least(token, owner, U256::from(3u64), &stop).await
            })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        ledger.set_token_balance(token, owner, U256::from(4u64));
        notifier.publish(1);

        assert_eq!(waiter.await.unwrap(), Some(U256::from(4u64)));
    }

    #[tokio::test(start_paused = true)]
    async fn balance_wait_ends_on_stop_without_new_block() {
        let ledger = Arc::new(FakeLedger::new());
        let notifier = BlockNotifier::new(0);
        let registry = Arc::new(AccountRegistry::with_seed(
            Account::random(),
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            notifier.subscribe(),
            1,
        ));
        let owner = Address::repeat_byte(0x02);
        ledger.set_balance(owner, U256::ZERO);

        let stop = CancellationToken::new();
        let waiter = {
            let registry = Arc::clone(&registry);
            let stop = stop.clone();
            tokio::spawn(async move {
                registry.wait_until_balance_at_least(owner, U256::from(5u64), &stop).await
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!waiter.is_finished());

        stop.cancel();
        let waited = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert_eq!(waited.expect("wait observes stop").unwrap(), None);
        assert_eq!(notifier.latest(), 0);
    }

    #[tokio::test]
    async fn stopped_wait_returns_before_reading_balance() {
        let (ledger, registry) = registry(1);
        let address = registry.account_at(0).unwrap().address();
        ledger.set_balance(address, U256::from(10u64));

        let stop = CancellationToken::new();
        stop.cancel();
        assert_eq!(registry.wait_until_balance_at_least(address, U256::ZERO, &stop).await, None);
    }

    #[tokio::test]
    async fn unchanged_pending_nonce_refuses_second_caller() {
        let ledger = Arc::new(FakeLedger::new().with_held_nonce_queries());
        let registry = registry_with(Arc::clone(&ledger), 7);
        let address = Address::repeat_byte(0x03);
        ledger.set_pending_nonce(address, 4);

        let first = registry.try_lock_nonce(address);
        let second = registry.try_lock_nonce(address);
        tokio::pin!(first, second);

        // Both callers pass the busy check before either lookup returns.
        assert!(futures::poll!(&mut first).is_pending());
        assert_eq!(ledger.nonce_queries(), 1);
        assert!(futures::poll!(&mut second).is_pending());
        assert!(!registry.is_nonce_locked(address));

        ledger.release_nonce_queries(2);
        let (first, second) = tokio::join!(first, second);

        assert!(first);
        assert!(!second);
        assert_eq!(ledger.nonce_queries(), 2);
        assert!(registry.is_nonce_locked(address));
    }
}
