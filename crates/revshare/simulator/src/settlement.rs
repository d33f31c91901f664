//! Expected-versus-actual reconciliation of fee-sharing payouts.

use std::{collections::BTreeMap, fmt};

use alloy_primitives::{Address, B256, I256, U256};
use tracing::debug;

use crate::{ChainResult, chain::Ledger, reward::RewardRule, transfer::TaskStats};

/// How a rule's payout scales with task progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceScope {
    /// Paid once per successful operation.
    PerOperation,
    /// Paid once per successful operation that exercised this step signature.
    PerStep(B256),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Beneficiary {
    opening_balance: U256,
    per_operation: U256,
    per_step: BTreeMap<B256, U256>,
}

impl Beneficiary {
    fn expected(&self, stats: &TaskStats) -> U256 {
        let steps = self.per_step.iter().fold(U256::ZERO, |acc, (step, price)| {
            let count = stats.steps.get(step).copied().unwrap_or_default();
            acc + *price * U256::from(count)
        });
        self.per_operation * U256::from(stats.success) + steps
    }
}

/// Opening balances and expected per-operation payouts of every observed beneficiary.
#[derive(Debug, Clone, Default)]
pub struct SettlementLedger {
    beneficiaries: BTreeMap<Address, Beneficiary>,
}

impl SettlementLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no beneficiary has been observed.
    pub fn is_empty(&self) -> bool {
        self.beneficiaries.is_empty()
    }

    /// Observed beneficiaries in address order.
    pub fn beneficiaries(&self) -> impl Iterator<Item = Address> + '_ {
        self.beneficiaries.keys().copied()
    }

    /// Adds `rule`'s payouts at `gas_price` to its beneficiaries.
    ///
    /// A beneficiary's opening balance is read the first time it is observed and never again.
    pub async fn observe(
        &mut self,
        ledger: &dyn Ledger,
        rule: &RewardRule,
        gas_price: U256,
        scope: PriceScope,
    ) -> ChainResult<()> {
        for reward in &rule.rewards {
            if !self.beneficiaries.contains_key(&reward.address) {
                let opening_balance = ledger.balance(reward.address).await?;
                debug!(address = %reward.address, %opening_balance, "observing beneficiary");
                self.beneficiaries
                    .insert(reward.address, Beneficiary { opening_balance, ..Default::default() });
            }

            let price = rule.payout(reward, gas_price);
            let Some(entry) = self.beneficiaries.get_mut(&reward.address) else { continue };
            match scope {
                PriceScope::PerOperation => entry.per_operation += price,
                PriceScope::PerStep(step) => *entry.per_step.entry(step).or_default() += price,
            }
        }
        Ok(())
    }

    /// Expected balance increase of `address` given the combined task counters.
    pub fn expected(&self, address: Address, stats: &TaskStats) -> Option<U256> {
        self.beneficiaries.get(&address).map(|entry| entry.expected(stats))
    }

    /// Compares expected and actual balance increases for every beneficiary.
    pub async fn settle(
        &self,
        ledger: &dyn Ledger,
        stats: &TaskStats,
    ) -> ChainResult<Vec<SettlementLine>> {
        let mut lines = Vec::with_capacity(self.beneficiaries.len());
        for (address, entry) in &self.beneficiaries {
            let current = ledger.balance(*address).await?;
            lines.push(SettlementLine {
                address: *address,
                expected: entry.expected(stats),
                actual: I256::from_raw(current).wrapping_sub(I256::from_raw(entry.opening_balance)),
            });
        }
        Ok(lines)
    }
}

/// Settlement outcome for one beneficiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementLine {
    /// Beneficiary.
    pub address: Address,
    /// Expected balance increase.
    pub expected: U256,
    /// Observed balance change since the opening balance.
    pub actual: I256,
}

impl SettlementLine {
    /// Whether the observed change matches the expectation.
    pub fn is_equal(&self) -> bool {
        I256::try_from(self.expected).is_ok_and(|expected| expected == self.actual)
    }
}

impl fmt::Display for SettlementLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "address={}, expected={}, actual={}, equal={}",
            self.address,
            self.expected,
            self.actual,
            self.is_equal()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reward::Reward, test_utils::FakeLedger};

    fn rule(gas: u64, shares: &[(u8, u32)]) -> RewardRule {
        RewardRule {
            signature: B256::repeat_byte(0xee),
            gas: U256::from(gas),
            rewards: shares
                .iter()
                .map(|(byte, percentage)| Reward {
                    address: Address::repeat_byte(*byte),
                    percentage: *percentage,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn opening_balance_is_captured_once() {
        let ledger = FakeLedger::new();
        let alice = Address::repeat_byte(1);
        ledger.set_balance(alice, U256::from(50u64));

        let mut settlement = SettlementLedger::new();
        let rule = rule(1000, &[(1, 10_000)]);
        settlement.observe(&ledger, &rule, U256::from(1u64), PriceScope::PerOperation).await.unwrap();
        ledger.set_balance(alice, U256::from(70u64));
        settlement.observe(&ledger, &rule, U256::from(1u64), PriceScope::PerOperation).await.unwrap();

        let stats = TaskStats { success: 1, ..Default::default() };
        assert_eq!(settlement.expected(alice, &stats), Some(U256::from(2000u64)));
        let lines = settlement.settle(&ledger, &stats).await.unwrap();
        assert_eq!(lines[0].actual, I256::try_from(20i64).unwrap());
        assert!(!lines[0].is_equal());
    }

    #[tokio::test]
    async fn step_prices_scale_with_step_counts() {
        let ledger = FakeLedger::new();
        let step = B256::repeat_byte(0x51);
        let mut settlement = SettlementLedger::new();
        let price = U256::from(2u64);
        let per_op = rule(100, &[(1, 5000), (2, 5000)]);
        settlement.observe(&ledger, &per_op, price, PriceScope::PerOperation).await.unwrap();
        let per_step = rule(10, &[(1, 10_000)]);
        settlement.observe(&ledger, &per_step, price, PriceScope::PerStep(step)).await.unwrap();

        let mut stats = TaskStats { success: 3, ..Default::default() };
        stats.steps.insert(step, 2);
        // 3 * (100 * 5000 / 10000 * 2) + 2 * (10 * 10000 / 10000 * 2)
        assert_eq!(settlement.expected(Address::repeat_byte(1), &stats), Some(U256::from(340u64)));
        assert_eq!(settlement.expected(Address::repeat_byte(2), &stats), Some(U256::from(300u64)));
        assert_eq!(settlement.expected(Address::repeat_byte(3), &stats), None);
    }

    #[test]
    fn line_format() {
        let line = SettlementLine {
            address: Address::repeat_byte(0x11),
            expected: U256::from(6000u64),
            actual: I256::try_from(6000i64).unwrap(),
        };
        assert_eq!(
            line.to_string(),
            "address=0x1111111111111111111111111111111111111111, expected=6000, actual=6000, equal=true"
        );

        let short = SettlementLine { actual: I256::try_from(-5i64).unwrap(), ..line };
        assert!(short.to_string().ends_with("actual=-5, equal=false"));
    }
}
