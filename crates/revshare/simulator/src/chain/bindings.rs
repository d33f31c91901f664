//! Solidity bindings for the contracts the simulator drives.

use alloy_sol_types::sol;

use crate::reward::{AdaptedConfig, AdaptedReward, AdaptedRule};

sol! {
    /// Minimal ERC20 surface.
    #[sol(rpc)]
    interface IERC20 {
        /// Emitted on every token movement.
        event Transfer(address indexed from, address indexed to, uint256 value);

        /// Emitted when an allowance is set.
        event Approval(address indexed owner, address indexed spender, uint256 value);

        /// Returns the token balance of `owner`.
        function balanceOf(address owner) external view returns (uint256);

        /// Returns the token symbol.
        function symbol() external view returns (string memory);

        /// Moves `amount` tokens from the caller to `to`.
        function transfer(address to, uint256 amount) external returns (bool);

        /// Moves `amount` tokens from `from` to `to` using the caller's allowance.
        function transferFrom(address from, address to, uint256 amount) external returns (bool);

        /// Sets `spender`'s allowance over the caller's tokens.
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Forwards approved ERC20 transfers on behalf of the caller.
    #[sol(rpc)]
    interface ITokenTransferProxy {
        /// Returns the token this proxy forwards.
        function tokenAddress() external view returns (address);

        /// Transfers `amount` of the caller's approved tokens to `to`.
        function proxyTransfer(address to, uint256 amount) external;
    }

    /// Fee-sharing configuration registry.
    #[sol(rpc)]
    interface IConfiguration {
        /// One beneficiary share in basis points.
        struct RewardShare {
            address rewardAddr;
            uint256 rewardPercentage;
        }

        /// Reward rule keyed by an event topic.
        struct EventConfig {
            bytes32 eventSignature;
            uint256 gas;
            RewardShare[] rewards;
        }

        /// Reward rule keyed by a function signature hash.
        struct FunctionConfig {
            bytes32 functionSignature;
            uint256 gas;
            RewardShare[] rewards;
        }

        /// Upper bound on the gas budget of a rule.
        function MAX_GAS() external view returns (uint256);

        /// Upper bound on beneficiaries per rule.
        function MAX_REWARDS() external view returns (uint256);

        /// Upper bound on event rules per config.
        function MAX_EVENTS() external view returns (uint256);

        /// Upper bound on function rules per config.
        function MAX_FUNCTIONS() external view returns (uint256);

        /// Registers a config for `configAddress`.
        function addConfig(
            address configAddress,
            EventConfig[] events,
            FunctionConfig[] functions,
            bool isActive
        ) external;

        /// Replaces the rules of an existing config.
        function updateConfig(
            address configAddress,
            EventConfig[] events,
            FunctionConfig[] functions
        ) external;

        /// Deletes the config for `configAddress`.
        function removeConfig(address configAddress) external;

        /// Activates or deactivates the config for `configAddress`.
        function setConfigStatus(address configAddress, bool isActive) external;

        /// Returns the config registered for `configAddress`.
        function getConfig(address configAddress) external view returns (
            address target,
            bool isActive,
            EventConfig[] events,
            FunctionConfig[] functions
        );
    }
}

impl From<&AdaptedReward> for IConfiguration::RewardShare {
    fn from(reward: &AdaptedReward) -> Self {
        Self { rewardAddr: reward.reward_addr, rewardPercentage: reward.reward_percentage }
    }
}

impl From<IConfiguration::RewardShare> for AdaptedReward {
    fn from(share: IConfiguration::RewardShare) -> Self {
        Self { reward_addr: share.rewardAddr, reward_percentage: share.rewardPercentage }
    }
}

impl From<&AdaptedRule> for IConfiguration::EventConfig {
    fn from(rule: &AdaptedRule) -> Self {
        Self {
            eventSignature: rule.signature,
            gas: rule.gas,
            rewards: rule.rewards.iter().map(Into::into).collect(),
        }
    }
}

impl From<IConfiguration::EventConfig> for AdaptedRule {
    fn from(event: IConfiguration::EventConfig) -> Self {
        Self {
            signature: event.eventSignature,
            gas: event.gas,
            rewards: event.rewards.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&AdaptedRule> for IConfiguration::FunctionConfig {
    fn from(rule: &AdaptedRule) -> Self {
        Self {
            functionSignature: rule.signature,
            gas: rule.gas,
            rewards: rule.rewards.iter().map(Into::into).collect(),
        }
    }
}

impl From<IConfiguration::FunctionConfig> for AdaptedRule {
    fn from(function: IConfiguration::FunctionConfig) -> Self {
        Self {
            signature: function.functionSignature,
            gas: function.gas,
            rewards: function.rewards.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<IConfiguration::getConfigReturn> for AdaptedConfig {
    fn from(ret: IConfiguration::getConfigReturn) -> Self {
        Self {
            config_address: ret.target,
            is_active: ret.isActive,
            events: ret.events.into_iter().map(Into::into).collect(),
            functions: ret.functions.into_iter().map(Into::into).collect(),
        }
    }
}
