//! Command-line front end over the wallet core.
//!
//! Every invocation opens the configured store, resumes the persisted session
//! if it is still inside the auto-lock window, runs one command and exits.

pub mod keys;
pub mod session;
pub mod tx;
pub mod wallet;

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use zeroize::Zeroizing;

use crate::config::WalletConfig;
use crate::context::WalletContext;
use crate::error::{Result, WalletError};
use crate::wallet::WalletManager;

#[derive(Parser)]
#[command(name = "octra_wallet")]
#[command(about = "Octra wallet key management and signing", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "octra_wallet.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Key generation and derivation (no storage involved)
    Keys {
        #[command(subcommand)]
        cmd: keys::KeysCommands,
    },
    /// Set up password protection, or opt out with --skip-password
    Init {
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        skip_password: bool,
    },
    Unlock {
        #[arg(long)]
        password: Option<String>,
        /// Deadline in seconds; defaults to `security.unlock_timeout_secs`
        #[arg(long)]
        timeout: Option<u64>,
    },
    Lock,
    Status,
    /// Set the auto-lock duration in seconds (0 disables)
    AutoLock { secs: u64 },
    ChangePassword {
        #[arg(long)]
        old: Option<String>,
        #[arg(long)]
        new: Option<String>,
    },
    /// Wallet management
    Wallet {
        #[command(subcommand)]
        cmd: wallet::WalletCommands,
    },
    /// Transaction signing and verification
    Tx {
        #[command(subcommand)]
        cmd: tx::TxCommands,
    },
    /// Confidential balance cipher
    Balance {
        #[command(subcommand)]
        cmd: tx::BalanceCommands,
    },
}

pub async fn run(cli: Cli, config: WalletConfig) -> Result<()> {
    match cli.command {
        Commands::Keys { cmd } => keys::handle_keys_command(cmd).await,
        Commands::Init { password, skip_password } => {
            session::handle_init(open_manager(config).await?, password, skip_password).await
        }
        Commands::Unlock { password, timeout } => {
            session::handle_unlock(open_manager(config).await?, password, timeout).await
        }
        Commands::Lock => session::handle_lock(open_manager(config).await?).await,
        Commands::Status => session::handle_status(open_manager(config).await?).await,
        Commands::AutoLock { secs } => session::handle_auto_lock(open_manager(config).await?, secs).await,
        Commands::ChangePassword { old, new } => {
            session::handle_change_password(open_manager(config).await?, old, new).await
        }
        Commands::Wallet { cmd } => wallet::handle_wallet_command(open_manager(config).await?, cmd).await,
        Commands::Tx { cmd } => tx::handle_tx_command(config, cmd).await,
        Commands::Balance { cmd } => tx::handle_balance_command(config, cmd).await,
    }
}

pub(crate) async fn open_manager(config: WalletConfig) -> Result<WalletManager> {
    let ctx = WalletContext::open(config)?;
    let mut manager = WalletManager::new(ctx);
    manager.initialize().await?;
    Ok(manager)
}

/// Value from the command line, or read from stdin after `label`.
pub(crate) fn password_or_prompt(value: Option<String>, label: &str) -> Result<Zeroizing<String>> {
    if let Some(value) = value {
        return Ok(Zeroizing::new(value));
    }
    print!("{}: ", label);
    io::stdout()
        .flush()
        .map_err(|e| WalletError::BadInputFormat(e.to_string()))?;
    let mut line = Zeroizing::new(String::new());
    io::stdin()
        .read_line(&mut line)
        .map_err(|e| WalletError::BadInputFormat(e.to_string()))?;
    Ok(Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
