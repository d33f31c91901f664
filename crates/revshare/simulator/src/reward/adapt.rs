use alloy_primitives::{Address, B256, U256};

use super::{Reward, RewardConfig, RewardRule};
use crate::RewardError;

/// On-chain form of a [`Reward`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedReward {
    /// Beneficiary.
    pub reward_addr: Address,
    /// Share in basis points.
    pub reward_percentage: U256,
}

/// On-chain form of a [`RewardRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedRule {
    /// Event topic or function signature hash.
    pub signature: B256,
    /// Gas budget.
    pub gas: U256,
    /// Beneficiary shares.
    pub rewards: Vec<AdaptedReward>,
}

/// On-chain form of a [`RewardConfig`], laid out as the configuration contract's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedConfig {
    /// Configured contract.
    pub config_address: Address,
    /// Whether the config is applied.
    pub is_active: bool,
    /// Event rules.
    pub events: Vec<AdaptedRule>,
    /// Function rules.
    pub functions: Vec<AdaptedRule>,
}

impl From<&Reward> for AdaptedReward {
    fn from(reward: &Reward) -> Self {
        Self { reward_addr: reward.address, reward_percentage: U256::from(reward.percentage) }
    }
}

impl From<&RewardRule> for AdaptedRule {
    fn from(rule: &RewardRule) -> Self {
        Self {
            signature: rule.signature,
            gas: rule.gas,
            rewards: rule.rewards.iter().map(Into::into).collect(),
        }
    }
}

/// Flattens `config` into the contract's argument layout.
pub fn adapt(config: &RewardConfig) -> AdaptedConfig {
    AdaptedConfig {
        config_address: config.address,
        is_active: config.is_active,
        events: config.events.iter().map(Into::into).collect(),
        functions: config.functions.iter().map(Into::into).collect(),
    }
}

impl TryFrom<AdaptedReward> for Reward {
    type Error = RewardError;

    fn try_from(reward: AdaptedReward) -> Result<Self, Self::Error> {
        let percentage = u32::try_from(reward.reward_percentage)
            .map_err(|_| RewardError::PercentageOutOfRange(reward.reward_percentage.to_string()))?;
        Ok(Self { address: reward.reward_addr, percentage })
    }
}

impl TryFrom<AdaptedRule> for RewardRule {
    type Error = RewardError;

    fn try_from(rule: AdaptedRule) -> Result<Self, Self::Error> {
        Ok(Self {
            signature: rule.signature,
            gas: rule.gas,
            rewards: rule.rewards.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?,
        })
    }
}

impl TryFrom<AdaptedConfig> for RewardConfig {
    type Error = RewardError;

    fn try_from(config: AdaptedConfig) -> Result<Self, Self::Error> {
        let rules = |rules: Vec<AdaptedRule>| {
            rules.into_iter().map(TryInto::try_into).collect::<Result<Vec<RewardRule>, _>>()
        };
        Ok(Self {
            address: config.config_address,
            is_active: config.is_active,
            events: rules(config.events)?,
            functions: rules(config.functions)?,
        })
    }
}
