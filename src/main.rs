use clap::Parser;
use tracing_subscriber::EnvFilter;

use octra_wallet::cli::{self, Cli};
use octra_wallet::config::WalletConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let bootstrap = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let config = WalletConfig::load_logged(&cli.config, bootstrap, std::io::stderr);

    // RUST_LOG wins over the config level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run(cli, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
