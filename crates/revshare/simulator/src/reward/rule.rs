use alloy_primitives::{Address, B256, U256};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Trigger, TriggerKind};
use crate::RewardError;

/// Basis points that make up a whole rule.
pub const TOTAL_SHARE: u32 = 10_000;

/// Largest draw used by [`split_shares`], so that an addition never consumes the whole pool.
const MAX_DRAW: f64 = 1.0 - f64::EPSILON;

/// One beneficiary's share of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    /// Beneficiary.
    pub address: Address,
    /// Share in basis points.
    pub percentage: u32,
}

/// Gas budget and beneficiary split for one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRule {
    /// Event topic or function signature hash.
    pub signature: B256,
    /// Gas budget shared among the beneficiaries.
    pub gas: U256,
    /// Beneficiary shares.
    pub rewards: Vec<Reward>,
}

impl RewardRule {
    /// Sum of all shares.
    pub fn total_percentage(&self) -> u64 {
        self.rewards.iter().map(|reward| u64::from(reward.percentage)).sum()
    }

    /// Wei paid to `reward` per trigger at `gas_price`: `gas * percentage / TOTAL_SHARE * gas_price`.
    pub fn payout(&self, reward: &Reward, gas_price: U256) -> U256 {
        self.gas * U256::from(reward.percentage) / U256::from(TOTAL_SHARE) * gas_price
    }
}

/// All rules registered for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardConfig {
    /// Configured contract.
    pub address: Address,
    /// Whether the chain applies the config.
    pub is_active: bool,
    /// Rules keyed by event topic.
    pub events: Vec<RewardRule>,
    /// Rules keyed by function signature hash.
    pub functions: Vec<RewardRule>,
}

impl RewardConfig {
    /// Event rule for `topic`.
    pub fn event(&self, topic: B256) -> Option<&RewardRule> {
        self.events.iter().find(|rule| rule.signature == topic)
    }

    /// Function rule for `signature`.
    pub fn function(&self, signature: B256) -> Option<&RewardRule> {
        self.functions.iter().find(|rule| rule.signature == signature)
    }
}

/// Splits `total_share` among `count` beneficiaries.
///
/// Everyone gets `floor(total_share * 0.8 / count)`. The remainder is handed out in order,
/// each beneficiary taking `floor(draw() * remaining)` of what is left, and whatever is still
/// left goes to the last beneficiary. The result always sums to `total_share`.
pub fn split_shares(
    total_share: u32,
    count: usize,
    mut draw: impl FnMut() -> f64,
) -> Result<Vec<u32>, RewardError> {
    let n = u32::try_from(count)
        .ok()
        .filter(|n| *n > 0)
        .ok_or(RewardError::NoBeneficiaries)?;

    let avg = floor_share(total_share, n);
    let mut remaining = total_share - avg * n;

    let mut shares = Vec::with_capacity(count);
    for _ in 0..count {
        let d = draw();
        let d = if d.is_finite() { d.clamp(0.0, MAX_DRAW) } else { 0.0 };
        let addition = (d * f64::from(remaining)).floor() as u32;
        shares.push(avg + addition);
        remaining -= addition;
    }

    if remaining > 0
        && let Some(last) = shares.last_mut()
    {
        *last += remaining;
    }
    Ok(shares)
}

/// `floor(total_share * 0.8 / n)` in integer arithmetic.
const fn floor_share(total_share: u32, n: u32) -> u32 {
    (total_share as u64 * 4 / 5 / n as u64) as u32
}

/// Builds a config for `target` with one rule per trigger.
///
/// Every rule gets `gas_budget` and a fresh split of `total_share` over `beneficiaries`.
pub fn generate<R: Rng>(
    target: Address,
    triggers: &[Trigger],
    beneficiaries: &[Address],
    total_share: u32,
    gas_budget: U256,
    rng: &mut R,
) -> Result<RewardConfig, RewardError> {
    if beneficiaries.is_empty() {
        return Err(RewardError::NoBeneficiaries);
    }

    let mut config =
        RewardConfig { address: target, is_active: false, events: Vec::new(), functions: Vec::new() };

    for trigger in triggers {
        let shares = split_shares(total_share, beneficiaries.len(), || rng.random::<f64>())?;
        let rule = RewardRule {
            signature: trigger.signature,
            gas: gas_budget,
            rewards: beneficiaries
                .iter()
                .zip(shares)
                .map(|(address, percentage)| Reward { address: *address, percentage })
                .collect(),
        };
        match trigger.kind {
            TriggerKind::Event => config.events.push(rule),
            TriggerKind::Function => config.functions.push(rule),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::single(1, vec![0.5], vec![10_000])]
    #[case::even_draws_zero(4, vec![0.0; 4], vec![2000, 2000, 2000, 4000])]
    #[case::first_takes_half(2, vec![0.5, 0.0], vec![5000, 5000])]
    #[case::draws_in_order(3, vec![0.5, 0.5, 0.5], vec![3667, 3166, 3167])]
    fn split_follows_draws(#[case] count: usize, #[case] draws: Vec<f64>, #[case] expected: Vec<u32>) {
        let mut draws = draws.into_iter();
        let shares = split_shares(TOTAL_SHARE, count, || draws.next().unwrap_or(0.0)).unwrap();
        assert_eq!(shares, expected);
    }

    #[test]
    fn split_requires_beneficiaries() {
        assert_eq!(split_shares(TOTAL_SHARE, 0, || 0.0), Err(RewardError::NoBeneficiaries));
    }

    #[test]
    fn out_of_range_draws_are_clamped() {
        let mut draws = [1.0, f64::NAN, -3.0, 7.0].into_iter();
        let shares = split_shares(TOTAL_SHARE, 4, || draws.next().unwrap()).unwrap();
        assert_eq!(shares.iter().sum::<u32>(), TOTAL_SHARE);
    }

    #[test]
    fn generate_sorts_rules_by_kind() {
        let beneficiaries = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = generate(
            Address::repeat_byte(9),
            &Trigger::erc20(),
            &beneficiaries,
            TOTAL_SHARE,
            U256::from(21_000u64),
            &mut rng,
        )
        .unwrap();

        assert!(!config.is_active);
        assert_eq!(config.events.len(), 1);
        assert_eq!(config.functions.len(), 2);
        for rule in config.events.iter().chain(&config.functions) {
            assert_eq!(rule.total_percentage(), u64::from(TOTAL_SHARE));
            assert_eq!(rule.gas, U256::from(21_000u64));
            let addresses: Vec<_> = rule.rewards.iter().map(|r| r.address).collect();
            assert_eq!(addresses, beneficiaries);
        }
        assert!(config.event(Trigger::erc20()[0].signature).is_some());
    }

    #[test]
    fn payout_divides_before_pricing() {
        let rule = RewardRule {
            signature: B256::ZERO,
            gas: U256::from(100u64),
            rewards: vec![
                Reward { address: Address::repeat_byte(1), percentage: 6000 },
                Reward { address: Address::repeat_byte(2), percentage: 4000 },
            ],
        };
        assert_eq!(rule.payout(&rule.rewards[0], U256::from(10u64)), U256::from(600u64));
        assert_eq!(rule.payout(&rule.rewards[1], U256::from(10u64)), U256::from(400u64));

        let odd = Reward { address: Address::ZERO, percentage: 3333 };
        // 100 * 3333 / 10000 = 33 before the price is applied.
        assert_eq!(rule.payout(&odd, U256::from(3u64)), U256::from(99u64));
    }

    proptest! {
        #[test]
        fn shares_always_sum_to_total(
            draws in proptest::collection::vec(any::<f64>(), 1..64),
            total in 1u32..=100_000,
        ) {
            let count = draws.len();
            let mut iter = draws.into_iter();
            let shares = split_shares(total, count, || iter.next().unwrap_or(0.0)).unwrap();
            prop_assert_eq!(shares.len(), count);
            prop_assert_eq!(shares.iter().map(|s| u64::from(*s)).sum::<u64>(), u64::from(total));
        }

        #[test]
        fn generated_rules_sum_to_total(seed in any::<u64>(), count in 1usize..16) {
            let beneficiaries: Vec<_> = (0..count).map(|i| Address::with_last_byte(i as u8)).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let config = generate(
                Address::ZERO,
                &Trigger::erc20(),
                &beneficiaries,
                TOTAL_SHARE,
                U256::from(1u64),
                &mut rng,
            )
            .unwrap();
            for rule in config.events.iter().chain(&config.functions) {
                prop_assert_eq!(rule.total_percentage(), u64::from(TOTAL_SHARE));
            }
        }
    }
}
