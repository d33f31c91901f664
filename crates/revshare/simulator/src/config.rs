//! Transfer tunables.

use std::time::Duration;

use alloy_primitives::U256;

/// One whole native token (10^18 wei).
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Tunables shared by every transfer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferSettings {
    /// Senders below this balance are topped up before transferring.
    pub min_balance: U256,
    /// Amount sent per top-up.
    pub sponsor_amount: U256,
    /// Amount moved by each simulated transfer.
    pub min_transfer_amount: U256,
    /// Delay after a failed attempt.
    pub retry_backoff: Duration,
    /// Gas kept by sponsor accounts, in multiples of `min_balance`.
    pub gas_reserve_factor: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            min_balance: U256::from(ONE_TOKEN),
            sponsor_amount: U256::from(100 * ONE_TOKEN),
            min_transfer_amount: U256::from(100_000u64),
            retry_backoff: Duration::from_millis(3000),
            gas_reserve_factor: 10,
        }
    }
}

impl TransferSettings {
    /// Sets the balance floor that triggers a top-up.
    pub const fn with_min_balance(mut self, amount: U256) -> Self {
        self.min_balance = amount;
        self
    }

    /// Sets the top-up amount.
    pub const fn with_sponsor_amount(mut self, amount: U256) -> Self {
        self.sponsor_amount = amount;
        self
    }

    /// Sets the amount moved per transfer.
    pub const fn with_min_transfer_amount(mut self, amount: U256) -> Self {
        self.min_transfer_amount = amount;
        self
    }

    /// Sets the delay after a failed attempt.
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the sponsor gas reserve factor.
    pub const fn with_gas_reserve_factor(mut self, factor: u64) -> Self {
        self.gas_reserve_factor = factor;
        self
    }

    /// Gas a sponsor account keeps for its own transactions.
    pub fn gas_reserve(&self) -> U256 {
        self.min_balance * U256::from(self.gas_reserve_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_simulation_constants() {
        let settings = TransferSettings::default();
        assert_eq!(settings.min_balance, U256::from(10u64).pow(U256::from(18)));
        assert_eq!(settings.sponsor_amount, U256::from(10u64).pow(U256::from(20)));
        assert_eq!(settings.min_transfer_amount, U256::from(100_000u64));
        assert_eq!(settings.retry_backoff, Duration::from_secs(3));
        assert_eq!(settings.gas_reserve(), U256::from(10 * ONE_TOKEN));
    }

    #[test]
    fn builders_override_fields() {
        let settings = TransferSettings::default()
            .with_retry_backoff(Duration::from_millis(10))
            .with_gas_reserve_factor(2)
            .with_min_balance(U256::from(5u64));
        assert_eq!(settings.retry_backoff, Duration::from_millis(10));
        assert_eq!(settings.gas_reserve(), U256::from(10u64));
    }
}
