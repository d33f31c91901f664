//! Error types for the simulator.

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Failure of an external chain capability: RPC, signing or contract call.
///
/// Inside a transfer task these are logged and classified as a failed attempt.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or node error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The transaction was mined with a failed status.
    #[error("{method} reverted in transaction {tx_hash}")]
    Reverted {
        /// Method that was called.
        method: &'static str,
        /// Hash of the reverted transaction.
        tx_hash: B256,
    },

    /// Local signing failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The transaction request could not be built.
    #[error("Invalid transaction request: {0}")]
    Request(String),

    /// A contract read returned data that could not be interpreted.
    #[error("Contract error: {0}")]
    Contract(String),
}

/// Result alias for chain capability calls.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors raised by the account registry and key store.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No accounts are registered.
    #[error("registry exhausted: no accounts available")]
    Empty,

    /// Fewer accounts are registered than the operation needs.
    #[error("registry has {available} accounts, {required} required")]
    Insufficient {
        /// Accounts the operation needs.
        required: usize,
        /// Accounts currently registered.
        available: usize,
    },

    /// An address is already registered with a different key.
    #[error("address {0} already registered with different key material")]
    DuplicateAddress(Address),

    /// Reading or writing the key store failed.
    #[error("key store error: {0}")]
    KeyStore(String),
}

/// Invalid task construction parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// A parameter is out of range.
    #[error("invalid task parameter: {0}")]
    InvalidParameter(String),
}

/// Malformed operator input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The line is not a recognized command.
    #[error("invalid command: {0:?}")]
    Invalid(String),

    /// A prompt answer is out of range or unparsable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised while building reward rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewardError {
    /// A trigger signature is not of the form `name(type,...)`.
    #[error("invalid signature: {0:?}")]
    InvalidSignature(String),

    /// A rule needs at least one beneficiary.
    #[error("no beneficiaries")]
    NoBeneficiaries,

    /// An on-chain value does not fit the local representation.
    #[error("percentage {0} out of range")]
    PercentageOutOfRange(String),
}

/// Top-level simulator error.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Chain capability error.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Task parameter error.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Operator input error.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Reward rule error.
    #[error(transparent)]
    Reward(#[from] RewardError),

    /// A task with this name already exists.
    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    /// Console I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for simulator operations.
pub type SimulatorResult<T> = Result<T, SimulatorError>;
