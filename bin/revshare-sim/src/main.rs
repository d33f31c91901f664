//! Revenue-sharing transfer simulator binary entry point.

mod app;
mod cli;

use clap::Parser;
use cli::Cli;
use revshare_cli_utils::LogConfig;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    LogConfig::from(cli.log.clone()).init_tracing_subscriber()?;

    app::run(cli).await
}
