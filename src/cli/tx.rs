use chrono::Utc;
use clap::Subcommand;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::balance;
use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::private_transfer;
use crate::transaction::{fee_for, SignedTransaction, Transaction};

use super::{open_manager, password_or_prompt};

#[derive(Subcommand)]
pub enum TxCommands {
    /// Build and sign a transfer from the active wallet
    Sign {
        #[arg(long)]
        to: String,
        /// Amount in OCT
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        nonce: u64,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Verify a signed transaction JSON object (with `signature` and `public_key`)
    Verify { json: String },
    /// Print the signing payload and its hash
    Hash { json: String },
}

#[derive(Subcommand)]
pub enum BalanceCommands {
    /// Encrypt an amount (micro-units) as v2
    Encrypt {
        amount: u64,
        /// Use this key instead of the active wallet
        #[arg(long)]
        private_key: Option<String>,
    },
    Decrypt {
        ciphertext: String,
        #[arg(long)]
        private_key: Option<String>,
    },
    /// Decrypt a private-transfer amount
    DecryptPrivate {
        ciphertext: String,
        #[arg(long)]
        private_key: String,
        #[arg(long)]
        ephemeral_public_key: String,
    },
}

fn signed_fields(value: &Value) -> Result<(String, String)> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WalletError::BadInputFormat(format!("missing {}", name)))
    };
    Ok((field("signature")?, field("public_key")?))
}

pub async fn handle_tx_command(config: WalletConfig, cmd: TxCommands) -> Result<()> {
    match cmd {
        TxCommands::Sign { to, amount, nonce, message, password } => {
            let mut manager = open_manager(config).await?;
            if !manager.is_unlocked() {
                let password = password_or_prompt(password, "Password")?;
                manager.unlock(&password).await?;
            }
            let from = manager
                .active()
                .ok_or_else(|| WalletError::WalletNotFound("no active wallet".to_string()))?;
            let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;
            let tx = Transaction::transfer(&from.address, &to, amount, nonce, timestamp, message.as_deref())?;
            let sig = manager.sign_with_active(&tx).await?;
            let signed = SignedTransaction {
                tx,
                signature: sig.signature_b64,
                public_key: from.public_key,
            };
            eprintln!("hash: {}  fee: {} OCT", sig.hash_hex, fee_for(amount));
            println!("{}", signed.to_json()?);
        }
        TxCommands::Verify { json } => {
            let value: Value = serde_json::from_str(&json)
                .map_err(|e| WalletError::BadInputFormat(format!("transaction: {}", e)))?;
            let (signature, public_key) = signed_fields(&value)?;
            let signed = SignedTransaction {
                tx: Transaction::from_value(value)?,
                signature,
                public_key,
            };
            if signed.verify() {
                println!("valid");
            } else {
                println!("INVALID");
            }
        }
        TxCommands::Hash { json } => {
            let tx = Transaction::from_json(&json)?;
            println!("{}", tx.canonical_payload()?);
            println!("{}", tx.hash()?);
        }
    }
    Ok(())
}

pub async fn handle_balance_command(config: WalletConfig, cmd: BalanceCommands) -> Result<()> {
    match cmd {
        BalanceCommands::Encrypt { amount, private_key } => {
            let ciphertext = match private_key {
                Some(key) => balance::encrypt_balance(amount, &Zeroizing::new(key))?,
                None => open_unlocked(config).await?.encrypt_balance(amount)?,
            };
            println!("{}", ciphertext);
        }
        BalanceCommands::Decrypt { ciphertext, private_key } => {
            let amount = match private_key {
                Some(key) => balance::decrypt_balance(&ciphertext, &Zeroizing::new(key))?,
                None => open_unlocked(config).await?.decrypt_balance(&ciphertext)?,
            };
            println!("{}", amount);
        }
        BalanceCommands::DecryptPrivate { ciphertext, private_key, ephemeral_public_key } => {
            let private_key = Zeroizing::new(private_key);
            let secret = private_transfer::derive_shared_secret(&private_key, &ephemeral_public_key)?;
            println!("{}", private_transfer::decrypt_private_amount(&ciphertext, &secret)?);
        }
    }
    Ok(())
}

async fn open_unlocked(config: WalletConfig) -> Result<crate::wallet::WalletManager> {
    let mut manager = open_manager(config).await?;
    if !manager.is_unlocked() {
        let password = password_or_prompt(None, "Password")?;
        manager.unlock(&password).await?;
    }
    Ok(manager)
}
