//! Wires the RPC adapters, key store and console into a simulation run.

use std::{fs, path::PathBuf, sync::Arc};

use alloy_primitives::Address;
use eyre::{WrapErr, bail, eyre};
use revshare_simulator::{
    Account, AccountRegistry, Console, KeyStore, PriceScope, Simulator, TransferSettings,
    accounts::generate_accounts,
    chain::{BlockNotifier, ContractClient, Ledger, RpcContractClient, RpcLedger},
    reward::{
        FeeConfigAdmin, FeeConfiguration, RewardConfig, RpcFeeConfiguration, TOTAL_SHARE,
        TRANSFER_EVENT, Trigger, generate, signature_hash,
    },
    transfer::{
        NativeTransfer, ProxyTransfer, SponsorNative, SponsorRange, SponsorToken, TaskEnv,
        TokenTransfer,
    },
};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader, Stdin, Stdout},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{
    Cli, Commands, FeeConfigAction, FeeConfigArgs, GenerateArgs, ProxyTransferArgs, RunArgs,
    SponsorArgs, TransferArgs,
};

const NATIVE_SYMBOL: &str = "NATIVE";

type StdConsole = Console<BufReader<Stdin>, Stdout>;

pub(crate) async fn run(cli: Cli) -> eyre::Result<()> {
    let deployer = match cli.private_key.as_deref() {
        Some(key) => Account::from_private_key(key).wrap_err("invalid PRIVATE_KEY")?,
        None => {
            error!("PRIVATE_KEY is not set");
            bail!("PRIVATE_KEY is not set");
        }
    };
    info!(deployer = %deployer.address(), rpc_url = %cli.rpc_url, network = %cli.network, "starting");

    let ledger = Arc::new(RpcLedger::new(cli.rpc_url.clone()));
    let client: Arc<dyn ContractClient> = Arc::new(
        RpcContractClient::connect(cli.rpc_url.clone(), cli.tx_type)
            .await
            .wrap_err("failed to connect to the node")?,
    );
    let mut console = Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                cancel.cancel();
            }
        }
    });

    match &cli.command {
        Commands::FeeConfig(args) => {
            fee_config(&cli, args, &ledger, client, Arc::new(deployer), &mut console).await
        }
        Commands::Transfer(_) | Commands::Sponsor(_) | Commands::ProxyTransfer(_) => {
            simulate(&cli, deployer, ledger, client, &mut console, cancel).await
        }
    }
}

async fn simulate(
    cli: &Cli,
    deployer: Account,
    ledger: Arc<RpcLedger>,
    client: Arc<dyn ContractClient>,
    console: &mut StdConsole,
    cancel: CancellationToken,
) -> eyre::Result<()> {
    let height = ledger.block_number().await.wrap_err("failed to read the block number")?;
    let notifier = BlockNotifier::new(height);
    // Outlives the interrupt so parked tasks keep seeing blocks until they are idle.
    let poller_cancel = CancellationToken::new();
    let poller =
        notifier.spawn_poller(ledger.clone(), cli.block_poll_interval(), poller_cancel.clone());

    let accounts = load_accounts(cli, console).await?;
    let registry = AccountRegistry::new(deployer, ledger.clone(), notifier.subscribe());
    registry.register_accounts(accounts)?;
    let env = TaskEnv::new(Arc::new(registry), client, TransferSettings::default());

    let mut simulator = Simulator::new(env);
    match &cli.command {
        Commands::Transfer(args) => setup_transfer(&mut simulator, args, &ledger, console).await?,
        Commands::Sponsor(args) => {
            setup_sponsor(&mut simulator, args, cli, &ledger, console).await?
        }
        Commands::ProxyTransfer(args) => {
            setup_proxy_transfer(&mut simulator, args, &ledger, console).await?
        }
        Commands::FeeConfig(_) => bail!("fee-config does not run a simulation"),
    }

    run_session(&simulator, console, cancel, poller_cancel, poller).await
}

/// Runs the operator console, waits for every task to go idle and only then stops the poller.
async fn run_session<R, W>(
    simulator: &Simulator,
    console: &mut Console<R, W>,
    cancel: CancellationToken,
    poller_cancel: CancellationToken,
    poller: JoinHandle<()>,
) -> eyre::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    console.run(simulator, cancel).await?;
    simulator.wait_idle().await;
    let report = simulator.show_status().await?;
    console.write_line(&report.to_string()).await?;

    poller_cancel.cancel();
    poller.await.wrap_err("block poller panicked")?;
    Ok(())
}

async fn load_accounts(cli: &Cli, console: &mut StdConsole) -> eyre::Result<Vec<Account>> {
    let store = KeyStore::for_network(&cli.db_dir, &cli.network, "accounts.json");
    let accounts = store.load()?;
    if accounts.len() == cli.accounts {
        return Ok(accounts);
    }

    warn!(stored = accounts.len(), expected = cli.accounts, path = %store.path().display(), "account count mismatch");
    let question = format!("Generate {} new accounts now?(y or n):", cli.accounts);
    if !console.confirm(&question).await? {
        bail!("{} holds {} accounts, {} required", store.path().display(), accounts.len(), cli.accounts);
    }

    let accounts = generate_accounts(cli.accounts);
    store.save(&accounts)?;
    Ok(accounts)
}

async fn run_params<R, W>(args: &RunArgs, console: &mut Console<R, W>) -> eyre::Result<(u64, u64)>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let simulators = match args.simulators {
        Some(0) => bail!("simulator count must be positive"),
        Some(count) => count,
        None => console.prompt_integer("Enter The Simulator Count:", false).await?,
    };
    let required = match args.required_success {
        Some(required) => required,
        None => console.prompt_integer("Enter The Required Success Count(e.g. 0~N):", true).await?,
    };
    Ok((simulators, required))
}

async fn token_symbol(ledger: &RpcLedger, token: Option<Address>) -> eyre::Result<String> {
    match token {
        Some(token) => {
            ledger.token_symbol(token).await.wrap_err_with(|| format!("failed to read symbol of {token}"))
        }
        None => Ok(NATIVE_SYMBOL.to_string()),
    }
}

async fn setup_transfer(
    simulator: &mut Simulator,
    args: &TransferArgs,
    ledger: &RpcLedger,
    console: &mut StdConsole,
) -> eyre::Result<()> {
    let (simulators, required) = run_params(&args.run, console).await?;
    let symbol = token_symbol(ledger, args.token).await?;

    for i in 0..simulators {
        let name = format!("transfer_{symbol}_{i}");
        match args.token {
            Some(token) => simulator.add_task(name, TokenTransfer::new(token, &symbol, required))?,
            None => simulator.add_task(name, NativeTransfer::new(required))?,
        }
    }

    if let (Some(token), Some(fee_config)) = (args.token, args.fee_config) {
        observe_fee_rules(simulator, ledger, fee_config, token).await?;
    }
    Ok(())
}

async fn setup_sponsor(
    simulator: &mut Simulator,
    args: &SponsorArgs,
    cli: &Cli,
    ledger: &RpcLedger,
    console: &mut StdConsole,
) -> eyre::Result<()> {
    let simulators = match args.simulators {
        Some(count) => count,
        None => console.prompt_integer("Enter The Simulator Count(e.g. 40):", false).await?,
    };
    let symbol = token_symbol(ledger, args.token).await?;
    let ranges = SponsorRange::partition(simulator.registry().len(), usize::try_from(simulators)?)?;
    let sponsors = KeyStore::for_network(&cli.db_dir, &cli.network, "sponsors.json");
    let settings = simulator.env().settings.clone();

    for (i, range) in ranges.into_iter().enumerate() {
        let name = format!("sponsor_{symbol}_{i}");
        match args.token {
            Some(token) => {
                let workload = SponsorToken::new(token, &symbol, range, args.amount, &settings)?;
                sponsors.append(workload.sponsor())?;
                simulator.add_task(name, workload)?;
            }
            None => {
                let workload = SponsorNative::new(range, args.amount, &settings)?;
                sponsors.append(workload.sponsor())?;
                simulator.add_task(name, workload)?;
            }
        }
    }
    Ok(())
}

async fn setup_proxy_transfer(
    simulator: &mut Simulator,
    args: &ProxyTransferArgs,
    ledger: &RpcLedger,
    console: &mut StdConsole,
) -> eyre::Result<()> {
    let token = ledger.proxy_token(args.proxy).await.wrap_err("failed to read the proxied token")?;
    if token.is_zero() {
        bail!("transfer proxy {} has no token", args.proxy);
    }
    let symbol = token_symbol(ledger, Some(token)).await?;
    let (simulators, required) = run_params(&args.run, console).await?;

    for i in 0..simulators {
        simulator.add_task(
            format!("proxy_transfer_{symbol}_{i}"),
            ProxyTransfer::new(token, args.proxy, &symbol, required),
        )?;
    }

    if let Some(fee_config) = args.fee_config {
        observe_fee_rules(simulator, ledger, fee_config, token).await?;
    }
    Ok(())
}

/// Observes the `Transfer` event rule per operation and every function rule per step.
async fn observe_fee_rules(
    simulator: &mut Simulator,
    ledger: &RpcLedger,
    fee_config: Address,
    token: Address,
) -> eyre::Result<()> {
    let fees = RpcFeeConfiguration::new(fee_config, ledger.provider().clone());
    let Some(config) = fees.config_of(token).await? else {
        warn!(%token, %fee_config, "token has no fee configuration, settlement disabled");
        return Ok(());
    };

    let transfer_topic = signature_hash(TRANSFER_EVENT)?;
    match config.event(transfer_topic) {
        Some(rule) => simulator.observe_rule(rule, PriceScope::PerOperation).await?,
        None => warn!(%token, "no rule for the Transfer event"),
    }
    for rule in &config.functions {
        simulator.observe_rule(rule, PriceScope::PerStep(rule.signature)).await?;
    }
    Ok(())
}

async fn fee_config(
    cli: &Cli,
    args: &FeeConfigArgs,
    ledger: &RpcLedger,
    client: Arc<dyn ContractClient>,
    deployer: Arc<Account>,
    console: &mut StdConsole,
) -> eyre::Result<()> {
    let fees = RpcFeeConfiguration::new(args.contract, ledger.provider().clone());
    let admin = FeeConfigAdmin::new(args.contract, deployer, client);

    let receipt = match &args.action {
        FeeConfigAction::Add(generate_args) => {
            let config = generate_config(cli, &fees, generate_args).await?;
            admin.add(&config).await?
        }
        FeeConfigAction::Update(generate_args) => {
            let config = generate_config(cli, &fees, generate_args).await?;
            admin.update(&config).await?
        }
        FeeConfigAction::Remove { target } => admin.remove(*target).await?,
        FeeConfigAction::SetStatus { target, active } => admin.set_status(*target, *active).await?,
        FeeConfigAction::Show { target } => {
            let config = fees
                .config_of(*target)
                .await?
                .ok_or_else(|| eyre!("{target} has no fee configuration"))?;
            console.write_line(&serde_json::to_string_pretty(&config)?).await?;
            return Ok(());
        }
    };

    info!(tx_hash = %receipt.tx_hash, block = ?receipt.block_number, "fee configuration updated");
    Ok(())
}

async fn generate_config(
    cli: &Cli,
    fees: &RpcFeeConfiguration,
    args: &GenerateArgs,
) -> eyre::Result<RewardConfig> {
    let beneficiary_count = match args.beneficiaries {
        Some(count) => count,
        None => fees.max_rewards().await?,
    };
    let gas = match args.gas {
        Some(gas) => gas,
        None => fees.max_gas().await?,
    };

    let beneficiaries: Vec<_> = generate_accounts(beneficiary_count).iter().map(Account::address).collect();
    let config = generate(
        args.target,
        &Trigger::erc20(),
        &beneficiaries,
        TOTAL_SHARE,
        gas,
        &mut rand::rng(),
    )?;

    let path = reward_config_path(cli, args.target);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, serde_json::to_string_pretty(&config)?)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    info!(contract = %args.target, beneficiaries = beneficiary_count, %gas, path = %path.display(), "generated reward config");
    Ok(config)
}

fn reward_config_path(cli: &Cli, target: Address) -> PathBuf {
    cli.db_dir.join(&cli.network).join("reward_configs").join(format!("{target}.json"))
}
