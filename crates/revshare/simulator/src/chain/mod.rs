//! Chain capabilities consumed by the simulator and their alloy-backed implementations.

use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use crate::{
    ChainResult,
    accounts::Account,
    reward::AdaptedConfig,
};

mod bindings;
pub use bindings::{IConfiguration, IERC20, ITokenTransferProxy};

mod blocks;
pub use blocks::BlockNotifier;

mod rpc;
pub use rpc::{RpcContractClient, RpcLedger};

/// Read access to balances, nonces and chain progress.
#[async_trait]
pub trait Ledger: Send + Sync + fmt::Debug {
    /// Native balance of `address`.
    async fn balance(&self, address: Address) -> ChainResult<U256>;

    /// ERC20 balance of `owner` in `token`.
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256>;

    /// ERC20 symbol of `token`.
    async fn token_symbol(&self, token: Address) -> ChainResult<String>;

    /// Transaction count of `address` including pending transactions.
    async fn pending_nonce(&self, address: Address) -> ChainResult<u64>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> ChainResult<u128>;

    /// Latest block number.
    async fn block_number(&self) -> ChainResult<u64>;
}

/// Submits signed transactions and waits for their receipts.
#[async_trait]
pub trait ContractClient: Send + Sync + fmt::Debug {
    /// Signs `request` with `signer`, sends it and waits until it is mined.
    ///
    /// A mined transaction with a failed status is an error.
    async fn submit(&self, signer: &Account, request: TxRequest) -> ChainResult<TxReceipt>;
}

/// Receipt summary of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
    /// Gas consumed.
    pub gas_used: u64,
}

/// A transaction the simulator wants mined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRequest {
    /// Plain native value transfer.
    Value {
        /// Recipient.
        to: Address,
        /// Amount in wei.
        amount: U256,
    },
    /// Contract call without value.
    Call {
        /// Contract address.
        contract: Address,
        /// Method and arguments.
        call: ContractCall,
    },
}

impl TxRequest {
    /// Native transfer of `amount` to `to`.
    pub const fn value(to: Address, amount: U256) -> Self {
        Self::Value { to, amount }
    }

    /// Call of `call` on `contract`.
    pub const fn call(contract: Address, call: ContractCall) -> Self {
        Self::Call { contract, call }
    }

    /// Method name used in logs and errors.
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Value { .. } => "transfer",
            Self::Call { call, .. } => call.method(),
        }
    }

    /// Transaction recipient.
    pub const fn to(&self) -> Address {
        match self {
            Self::Value { to, .. } => *to,
            Self::Call { contract, .. } => *contract,
        }
    }

    /// Attached native value.
    pub const fn amount(&self) -> U256 {
        match self {
            Self::Value { amount, .. } => *amount,
            Self::Call { .. } => U256::ZERO,
        }
    }

    /// ABI-encoded calldata, empty for value transfers.
    pub fn input(&self) -> Bytes {
        match self {
            Self::Value { .. } => Bytes::new(),
            Self::Call { call, .. } => call.abi_encode(),
        }
    }
}

/// Contract methods the simulator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// ERC20 `transfer(to, amount)`.
    Transfer {
        /// Recipient.
        to: Address,
        /// Token amount.
        amount: U256,
    },
    /// ERC20 `approve(spender, amount)`.
    Approve {
        /// Spender.
        spender: Address,
        /// Allowance.
        amount: U256,
    },
    /// Proxy `proxyTransfer(to, amount)`.
    ProxyTransfer {
        /// Recipient.
        to: Address,
        /// Token amount.
        amount: U256,
    },
    /// Fee configuration `addConfig`.
    AddConfig(AdaptedConfig),
    /// Fee configuration `updateConfig`.
    UpdateConfig(AdaptedConfig),
    /// Fee configuration `removeConfig`.
    RemoveConfig {
        /// Configured contract.
        target: Address,
    },
    /// Fee configuration `setConfigStatus`.
    SetConfigStatus {
        /// Configured contract.
        target: Address,
        /// New status.
        active: bool,
    },
}

impl ContractCall {
    /// Solidity method name.
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::Approve { .. } => "approve",
            Self::ProxyTransfer { .. } => "proxyTransfer",
            Self::AddConfig(_) => "addConfig",
            Self::UpdateConfig(_) => "updateConfig",
            Self::RemoveConfig { .. } => "removeConfig",
            Self::SetConfigStatus { .. } => "setConfigStatus",
        }
    }

    /// ABI-encoded calldata including the selector.
    pub fn abi_encode(&self) -> Bytes {
        let encoded = match self {
            Self::Transfer { to, amount } => {
                IERC20::transferCall { to: *to, amount: *amount }.abi_encode()
            }
            Self::Approve { spender, amount } => {
                IERC20::approveCall { spender: *spender, amount: *amount }.abi_encode()
            }
            Self::ProxyTransfer { to, amount } => {
                ITokenTransferProxy::proxyTransferCall { to: *to, amount: *amount }.abi_encode()
            }
            Self::AddConfig(config) => IConfiguration::addConfigCall {
                configAddress: config.config_address,
                events: config.events.iter().map(Into::into).collect(),
                functions: config.functions.iter().map(Into::into).collect(),
                isActive: config.is_active,
            }
            .abi_encode(),
            Self::UpdateConfig(config) => IConfiguration::updateConfigCall {
                configAddress: config.config_address,
                events: config.events.iter().map(Into::into).collect(),
                functions: config.functions.iter().map(Into::into).collect(),
            }
            .abi_encode(),
            Self::RemoveConfig { target } => {
                IConfiguration::removeConfigCall { configAddress: *target }.abi_encode()
            }
            Self::SetConfigStatus { target, active } => {
                IConfiguration::setConfigStatusCall { configAddress: *target, isActive: *active }
                    .abi_encode()
            }
        };
        encoded.into()
    }
}

/// Fee fields used when signing transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeeMode {
    /// Type 0 transactions priced with `gasPrice`.
    #[default]
    Legacy,
    /// Type 2 transactions priced with `maxFeePerGas` / `maxPriorityFeePerGas`.
    Eip1559,
}

impl FromStr for FeeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "0" => Ok(Self::Legacy),
            "eip1559" | "dynamic" | "2" => Ok(Self::Eip1559),
            other => Err(format!("unsupported tx type {other:?}, expected legacy or eip1559")),
        }
    }
}

impl fmt::Display for FeeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Eip1559 => f.write_str("eip1559"),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use rstest::rstest;

    use super::*;

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");
    const BOB: Address = address!("00000000000000000000000000000000000000b0");

    #[test]
    fn value_request_has_no_calldata() {
        let request = TxRequest::value(BOB, U256::from(7u64));
        assert_eq!(request.to(), BOB);
        assert_eq!(request.amount(), U256::from(7u64));
        assert!(request.input().is_empty());
    }

    #[test]
    fn token_transfer_calldata_starts_with_selector() {
        let request =
            TxRequest::call(TOKEN, ContractCall::Transfer { to: BOB, amount: U256::from(1u64) });
        let input = request.input();
        assert_eq!(request.to(), TOKEN);
        assert_eq!(request.amount(), U256::ZERO);
        assert_eq!(&input[..4], IERC20::transferCall::SELECTOR.as_slice());
        let decoded = IERC20::transferCall::abi_decode(&input).expect("decodes");
        assert_eq!(decoded.to, BOB);
        assert_eq!(decoded.amount, U256::from(1u64));
    }

    #[rstest]
    #[case::approve(ContractCall::Approve { spender: BOB, amount: U256::ZERO }, "approve")]
    #[case::proxy(ContractCall::ProxyTransfer { to: BOB, amount: U256::ZERO }, "proxyTransfer")]
    #[case::remove(ContractCall::RemoveConfig { target: TOKEN }, "removeConfig")]
    #[case::status(ContractCall::SetConfigStatus { target: TOKEN, active: true }, "setConfigStatus")]
    fn method_names(#[case] call: ContractCall, #[case] expected: &str) {
        assert_eq!(call.method(), expected);
    }

    #[rstest]
    #[case::legacy("legacy", FeeMode::Legacy)]
    #[case::legacy_numeric("0", FeeMode::Legacy)]
    #[case::eip1559("EIP1559", FeeMode::Eip1559)]
    #[case::eip1559_numeric("2", FeeMode::Eip1559)]
    fn fee_mode_parsing(#[case] input: &str, #[case] expected: FeeMode) {
        assert_eq!(input.parse::<FeeMode>(), Ok(expected));
    }

    #[test]
    fn fee_mode_rejects_unknown_types() {
        assert!("1".parse::<FeeMode>().is_err());
    }
}
