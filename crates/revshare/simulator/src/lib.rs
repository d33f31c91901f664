#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::{
    ChainError, ChainResult, CommandError, RegistryError, RewardError, SimulatorError,
    SimulatorResult, TaskError,
};

mod config;
pub use config::{ONE_TOKEN, TransferSettings};

pub mod accounts;
pub use accounts::{Account, AccountRegistry, KeyStore};

pub mod chain;

pub mod reward;

pub mod transfer;
pub use transfer::{TransferResult, TransferTask};

pub mod settlement;
pub use settlement::{PriceScope, SettlementLedger, SettlementLine};

pub mod simulator;
pub use simulator::{Command, Console, Simulator, StatusReport};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
