//! Reward rule generation and the fee-sharing configuration client.

mod trigger;
pub use trigger::{
    TRANSFER_EVENT, TRANSFER_FROM_FUNCTION, TRANSFER_FUNCTION, Trigger, TriggerKind,
    call_signature, canonical_signature, signature_hash,
};

mod rule;
pub use rule::{Reward, RewardConfig, RewardRule, TOTAL_SHARE, generate, split_shares};

mod adapt;
pub use adapt::{AdaptedConfig, AdaptedReward, AdaptedRule, adapt};

mod fee_config;
pub use fee_config::{FeeConfigAdmin, FeeConfiguration, RpcFeeConfiguration};
