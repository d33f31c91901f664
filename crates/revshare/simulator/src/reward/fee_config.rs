//! Reads and writes of the on-chain fee-sharing configuration.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use alloy_provider::RootProvider;
use async_trait::async_trait;
use tracing::info;

use super::{AdaptedConfig, RewardConfig, RewardRule, adapt};
use crate::{
    ChainError, ChainResult,
    accounts::Account,
    chain::{ContractCall, ContractClient, IConfiguration, TxReceipt, TxRequest},
};

/// Read access to the fee-sharing configuration contract.
#[async_trait]
pub trait FeeConfiguration: Send + Sync + fmt::Debug {
    /// Largest gas budget a rule may carry.
    async fn max_gas(&self) -> ChainResult<U256>;

    /// Largest number of beneficiaries per rule.
    async fn max_rewards(&self) -> ChainResult<usize>;

    /// Config registered for `target`, if any.
    async fn config_of(&self, target: Address) -> ChainResult<Option<RewardConfig>>;

    /// Rule of `target` keyed by the event topic `topic`.
    async fn rev_share_rule(&self, target: Address, topic: B256) -> ChainResult<Option<RewardRule>> {
        Ok(self.config_of(target).await?.and_then(|config| config.event(topic).cloned()))
    }
}

/// [`FeeConfiguration`] over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcFeeConfiguration {
    address: Address,
    provider: RootProvider,
}

impl RpcFeeConfiguration {
    /// Reads the configuration contract at `address` through `provider`.
    pub const fn new(address: Address, provider: RootProvider) -> Self {
        Self { address, provider }
    }

    /// Configuration contract address.
    pub const fn address(&self) -> Address {
        self.address
    }

    fn contract(&self) -> IConfiguration::IConfigurationInstance<RootProvider> {
        IConfiguration::new(self.address, self.provider.clone())
    }

    /// Largest number of event rules per config.
    pub async fn max_events(&self) -> ChainResult<U256> {
        self.contract().MAX_EVENTS().call().await.map_err(|e| contract_error("MAX_EVENTS", e))
    }

    /// Largest number of function rules per config.
    pub async fn max_functions(&self) -> ChainResult<U256> {
        self.contract().MAX_FUNCTIONS().call().await.map_err(|e| contract_error("MAX_FUNCTIONS", e))
    }
}

fn contract_error(method: &str, err: impl fmt::Display) -> ChainError {
    ChainError::Contract(format!("{method} failed: {err}"))
}

#[async_trait]
impl FeeConfiguration for RpcFeeConfiguration {
    async fn max_gas(&self) -> ChainResult<U256> {
        self.contract().MAX_GAS().call().await.map_err(|e| contract_error("MAX_GAS", e))
    }

    async fn max_rewards(&self) -> ChainResult<usize> {
        let max = self
            .contract()
            .MAX_REWARDS()
            .call()
            .await
            .map_err(|e| contract_error("MAX_REWARDS", e))?;
        usize::try_from(max).map_err(|_| contract_error("MAX_REWARDS", format!("{max} too large")))
    }

    async fn config_of(&self, target: Address) -> ChainResult<Option<RewardConfig>> {
        let raw = self
            .contract()
            .getConfig(target)
            .call()
            .await
            .map_err(|e| contract_error("getConfig", e))?;
        if raw.target.is_zero() {
            return Ok(None);
        }

        let config = RewardConfig::try_from(AdaptedConfig::from(raw))
            .map_err(|e| contract_error("getConfig", e))?;
        Ok(Some(config))
    }
}

/// Admin writes to the configuration contract, signed by one account.
#[derive(Debug, Clone)]
pub struct FeeConfigAdmin {
    address: Address,
    admin: Arc<Account>,
    client: Arc<dyn ContractClient>,
}

impl FeeConfigAdmin {
    /// Writes to the contract at `address` as `admin`.
    pub const fn new(address: Address, admin: Arc<Account>, client: Arc<dyn ContractClient>) -> Self {
        Self { address, admin, client }
    }

    async fn send(&self, call: ContractCall) -> ChainResult<TxReceipt> {
        let method = call.method();
        let receipt = self.client.submit(&self.admin, TxRequest::call(self.address, call)).await?;
        info!(method, tx_hash = %receipt.tx_hash, "fee configuration updated");
        Ok(receipt)
    }

    /// Registers `config`.
    pub async fn add(&self, config: &RewardConfig) -> ChainResult<TxReceipt> {
        self.send(ContractCall::AddConfig(adapt(config))).await
    }

    /// Replaces the rules of an existing config.
    pub async fn update(&self, config: &RewardConfig) -> ChainResult<TxReceipt> {
        self.send(ContractCall::UpdateConfig(adapt(config))).await
    }

    /// Deletes the config of `target`.
    pub async fn remove(&self, target: Address) -> ChainResult<TxReceipt> {
        self.send(ContractCall::RemoveConfig { target }).await
    }

    /// Activates or deactivates the config of `target`.
    pub async fn set_status(&self, target: Address, active: bool) -> ChainResult<TxReceipt> {
        self.send(ContractCall::SetConfigStatus { target, active }).await
    }
}
