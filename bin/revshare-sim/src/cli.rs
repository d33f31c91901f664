//! Command line arguments for the revshare-sim binary.

use std::{path::PathBuf, time::Duration};

use alloy_primitives::{Address, U256};
use clap::{Args, Parser, Subcommand};
use revshare_simulator::chain::FeeMode;
use url::Url;

revshare_cli_utils::define_log_args!("REVSHARE");

/// Concurrent transfer load simulator with revenue-sharing settlement checks.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// JSON-RPC endpoint of the node under test
    #[arg(long, env = "REVSHARE_RPC_URL", default_value = "http://127.0.0.1:8545", global = true)]
    pub rpc_url: Url,

    /// Network name, selects the key store directory `<db-dir>/<network>/`
    #[arg(long, env = "NETWORK", default_value = "local", global = true)]
    pub network: String,

    /// Root directory of the key store
    #[arg(long, default_value = "db", global = true)]
    pub db_dir: PathBuf,

    /// Private key of the funding deployer account
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true, hide = true, global = true)]
    pub private_key: Option<String>,

    /// Transaction type (legacy or eip1559)
    #[arg(long, default_value = "eip1559", global = true)]
    pub tx_type: FeeMode,

    /// Block number poll interval in milliseconds
    #[arg(long = "block-poll-interval-ms", default_value = "1000", global = true)]
    pub block_poll_interval_ms: u64,

    /// Number of simulation accounts kept in the key store
    #[arg(long, default_value = "2000", global = true)]
    pub accounts: usize,

    /// Logging configuration.
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub(crate) const fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }
}

/// Simulation and administration subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Random transfers between simulation accounts
    Transfer(TransferArgs),
    /// Bring every simulation account up to a balance
    Sponsor(SponsorArgs),
    /// Token transfers through the transfer proxy
    ProxyTransfer(ProxyTransferArgs),
    /// Manage the fee-sharing configuration
    FeeConfig(FeeConfigArgs),
}

/// Task count and success target, prompted for when absent.
#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// Number of concurrent tasks
    #[arg(long)]
    pub simulators: Option<u64>,

    /// Successful transfers per task, 0 runs until stopped
    #[arg(long)]
    pub required_success: Option<u64>,
}

#[derive(Debug, Args)]
pub(crate) struct TransferArgs {
    /// ERC20 token to transfer, native transfers when absent
    #[arg(long)]
    pub token: Option<Address>,

    /// Fee configuration contract whose rules for the token are settled
    #[arg(long, env = "REVSHARE_FEE_CONFIG")]
    pub fee_config: Option<Address>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args)]
pub(crate) struct SponsorArgs {
    /// ERC20 token to sponsor, native balance when absent
    #[arg(long)]
    pub token: Option<Address>,

    /// Number of concurrent sponsor tasks
    #[arg(long)]
    pub simulators: Option<u64>,

    /// Balance every account is brought up to, in wei
    #[arg(long, default_value = "1000000000000000000000")]
    pub amount: U256,
}

#[derive(Debug, Args)]
pub(crate) struct ProxyTransferArgs {
    /// Transfer proxy contract
    #[arg(long, env = "REVSHARE_TRANSFER_PROXY")]
    pub proxy: Address,

    /// Fee configuration contract whose rules for the proxied token are settled
    #[arg(long, env = "REVSHARE_FEE_CONFIG")]
    pub fee_config: Option<Address>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args)]
pub(crate) struct FeeConfigArgs {
    /// Fee configuration contract
    #[arg(long, env = "REVSHARE_FEE_CONFIG")]
    pub contract: Address,

    #[command(subcommand)]
    pub action: FeeConfigAction,
}

/// Rule generation parameters.
#[derive(Debug, Args)]
pub(crate) struct GenerateArgs {
    /// Contract the config applies to
    pub target: Address,

    /// Beneficiaries per rule, defaults to the contract maximum
    #[arg(long)]
    pub beneficiaries: Option<usize>,

    /// Gas budget per rule, defaults to the contract maximum
    #[arg(long)]
    pub gas: Option<U256>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum FeeConfigAction {
    /// Generate and register a config for an ERC20 token
    Add(GenerateArgs),
    /// Generate and replace the config of an ERC20 token
    Update(GenerateArgs),
    /// Remove the config of a contract
    Remove {
        /// Configured contract
        target: Address,
    },
    /// Activate or deactivate the config of a contract
    SetStatus {
        /// Configured contract
        target: Address,
        /// New status
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Print the config of a contract
    Show {
        /// Configured contract
        target: Address,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_transfer_with_defaults() {
        let cli = Cli::try_parse_from(["revshare-sim", "transfer", "--simulators", "4"]).unwrap();
        assert_eq!(cli.accounts, 2000);
        assert_eq!(cli.tx_type, FeeMode::Eip1559);
        let Commands::Transfer(args) = cli.command else { panic!("expected transfer") };
        assert_eq!(args.token, None);
        assert_eq!(args.run.simulators, Some(4));
        assert_eq!(args.run.required_success, None);
    }

    #[test]
    fn parses_fee_config_status() {
        let cli = Cli::try_parse_from([
            "revshare-sim",
            "fee-config",
            "--contract",
            "0x00000000000000000000000000000000000000cc",
            "set-status",
            "0x00000000000000000000000000000000000000aa",
            "false",
        ])
        .unwrap();
        let Commands::FeeConfig(args) = cli.command else { panic!("expected fee-config") };
        assert!(matches!(args.action, FeeConfigAction::SetStatus { active: false, .. }));
    }
}
