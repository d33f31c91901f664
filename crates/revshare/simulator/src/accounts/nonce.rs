use std::sync::atomic::{AtomicI64, Ordering};

use alloy_primitives::Address;
use tokio::sync::Mutex;

use super::AccountRegistry;

/// Marker stored in [`NonceLock::cached`] while no transaction is in flight.
pub(super) const UNSET: i64 = -1;

/// Per-address issuance lock.
///
/// `cached` is read without the gate on the fast path. The gate serializes the
/// authoritative pending-nonce comparison.
#[derive(Debug)]
pub(super) struct NonceLock {
    cached: AtomicI64,
    gate: Mutex<()>,
}

impl Default for NonceLock {
    fn default() -> Self {
        Self { cached: AtomicI64::new(UNSET), gate: Mutex::new(()) }
    }
}

impl NonceLock {
    /// Whether a transaction is currently in flight for the address.
    pub(super) fn is_busy(&self) -> bool {
        self.cached.load(Ordering::Relaxed) >= 0
    }

    pub(super) fn cached(&self) -> i64 {
        self.cached.load(Ordering::Acquire)
    }

    pub(super) fn set_cached(&self, nonce: i64) {
        self.cached.store(nonce, Ordering::Release);
    }

    pub(super) fn reset(&self) {
        self.cached.store(UNSET, Ordering::Release);
    }

    pub(super) const fn gate(&self) -> &Mutex<()> {
        &self.gate
    }
}

/// Exclusive right to issue the next transaction for one address.
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
#[must_use = "dropping the guard releases the nonce lock immediately"]
pub struct NonceGuard<'a> {
    registry: &'a AccountRegistry,
    address: Address,
    nonce: u64,
}

impl<'a> NonceGuard<'a> {
    pub(super) const fn new(registry: &'a AccountRegistry, address: Address, nonce: u64) -> Self {
        Self { registry, address, nonce }
    }

    /// Locked address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Pending nonce observed when the lock was granted.
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl Drop for NonceGuard<'_> {
    fn drop(&mut self) {
        self.registry.unlock_nonce(self.address);
    }
}
