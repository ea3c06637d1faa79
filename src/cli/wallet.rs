use clap::Subcommand;
use zeroize::Zeroizing;

use crate::error::Result;
use crate::wallet::{MetadataPatch, WalletManager};

use super::{password_or_prompt, print_json};

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new mnemonic wallet
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: Option<String>,
        /// Leave the current active wallet in place
        #[arg(long)]
        inactive: bool,
    },
    /// Import a wallet from a base64 private key or a 12-word mnemonic
    Import {
        #[arg(long)]
        name: String,
        #[arg(long, conflicts_with = "mnemonic")]
        private_key: Option<String>,
        /// Expected address; import fails if the key derives another one
        #[arg(long, requires = "private_key")]
        address: Option<String>,
        #[arg(long)]
        mnemonic: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        inactive: bool,
    },
    /// List all wallets
    List {
        #[arg(long)]
        password: Option<String>,
    },
    /// Make a wallet the active one
    Activate {
        id: String,
        #[arg(long)]
        password: Option<String>,
    },
    Rename {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Set icon, color or category
    Meta {
        id: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    Delete {
        id: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Print the {priv, addr, rpc} export for the Octra CLI
    Export {
        id: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Move quarantined entries back into an empty vault and retry them
    Recover,
}

/// Unlock if needed and return the confirmation password. No-password
/// vaults need neither.
async fn authorize(manager: &mut WalletManager, password: Option<String>) -> Result<Zeroizing<String>> {
    if manager.status().await?.password_skipped {
        return Ok(Zeroizing::new(String::new()));
    }
    let password = password_or_prompt(password, "Password")?;
    if !manager.is_unlocked() {
        manager.unlock(&password).await?;
    }
    Ok(password)
}

pub async fn handle_wallet_command(mut manager: WalletManager, cmd: WalletCommands) -> Result<()> {
    match cmd {
        WalletCommands::Create { name, password, inactive } => {
            let password = authorize(&mut manager, password).await?;
            let summary = manager.create(&name, &password, !inactive).await?;
            let record = manager.export(&summary.id)?;
            println!("Wallet '{}' created.", summary.name);
            println!("Address:  {}", summary.address);
            if let Some(words) = &record.mnemonic {
                println!("Mnemonic: {}", words.phrase().as_str());
                println!("KEEP THIS SAFE!");
            }
        }
        WalletCommands::Import { name, private_key, address, mnemonic, password, inactive } => {
            let password = authorize(&mut manager, password).await?;
            let summary = match (private_key, mnemonic) {
                (Some(key), _) => {
                    let key = Zeroizing::new(key);
                    manager
                        .import(&name, &key, address.as_deref(), &password, !inactive)
                        .await?
                }
                (None, Some(phrase)) => {
                    let phrase = Zeroizing::new(phrase);
                    manager.import_mnemonic(&name, &phrase, &password, !inactive).await?
                }
                (None, None) => {
                    let key = password_or_prompt(None, "Private key (base64)")?;
                    manager
                        .import(&name, &key, address.as_deref(), &password, !inactive)
                        .await?
                }
            };
            println!("Wallet '{}' imported: {}", summary.name, summary.address);
        }
        WalletCommands::List { password } => {
            if !manager.is_unlocked() {
                authorize(&mut manager, password).await?;
            }
            for w in manager.list() {
                println!(
                    "{} {:<30} {} {}",
                    if w.is_active { "*" } else { " " },
                    w.name,
                    w.address,
                    w.id
                );
            }
        }
        WalletCommands::Activate { id, password } => {
            if !manager.is_unlocked() {
                authorize(&mut manager, password).await?;
            }
            manager.set_active(&id).await?;
            println!("Active wallet: {}", id);
        }
        WalletCommands::Rename { id, name, password } => {
            let password = authorize(&mut manager, password).await?;
            let summary = manager.rename(&id, &name, &password).await?;
            println!("Renamed to '{}'.", summary.name);
        }
        WalletCommands::Meta { id, icon, color, category, password } => {
            if !manager.is_unlocked() {
                authorize(&mut manager, password).await?;
            }
            let summary = manager
                .update_metadata(&id, MetadataPatch { icon, color, category })
                .await?;
            print_json(&summary.metadata)?;
        }
        WalletCommands::Delete { id, password } => {
            let password = authorize(&mut manager, password).await?;
            manager.delete(&id, &password).await?;
            println!("Wallet {} deleted.", id);
        }
        WalletCommands::Export { id, password } => {
            if !manager.is_unlocked() {
                authorize(&mut manager, password).await?;
            }
            print_json(&manager.export_portable(&id)?)?;
        }
        WalletCommands::Recover => {
            if manager.is_unlocked() {
                manager.lock().await?;
            }
            let restored = manager.restore_quarantined().await?;
            println!("{} quarantined wallet(s) restored. Run `unlock` to load them.", restored);
        }
    }
    Ok(())
}
