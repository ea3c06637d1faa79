use clap::Subcommand;

use crate::address::{derive_address, verify_address_format};
use crate::encoding::hex_decode;
use crate::error::Result;
use crate::keys;
use crate::mnemonic;

use super::print_json;

#[derive(Subcommand, Debug, Clone)]
pub enum KeysCommands {
    /// Generate a fresh mnemonic and keypair and print them
    Generate,
    /// Print every derivation step for 16 bytes of hex entropy
    Derive {
        #[arg(long)]
        entropy: String,
    },
    /// Derive keys from an existing 12-word phrase
    Restore {
        #[arg(long)]
        mnemonic: String,
    },
    /// Derive the address for a base64 public key
    Address {
        #[arg(long)]
        public_key: String,
    },
    /// Check an address or mnemonic without deriving anything
    Check {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        mnemonic: Option<String>,
    },
}

pub async fn handle_keys_command(cmd: KeysCommands) -> Result<()> {
    match cmd {
        KeysCommands::Generate => {
            let w = keys::generate_async().await?;
            println!("Mnemonic:    {}", w.mnemonic.as_str());
            println!("Private key: {}", w.private_key_b64.as_str());
            println!("Public key:  {}", w.public_key_b64);
            println!("Address:     {}", w.address);
            println!("Self-test:   {}", if w.test_signature_valid { "ok" } else { "FAILED" });
            println!("KEEP THE MNEMONIC AND PRIVATE KEY SAFE!");
        }
        KeysCommands::Derive { entropy } => {
            let entropy = hex_decode(entropy.trim())?;
            print_json(&keys::derive_from_entropy(&entropy)?)?;
        }
        KeysCommands::Restore { mnemonic } => {
            let w = keys::restore_from_mnemonic_async(&mnemonic).await?;
            println!("Public key: {}", w.public_key_b64);
            println!("Address:    {}", w.address);
        }
        KeysCommands::Address { public_key } => {
            println!("{}", derive_address(public_key.trim())?);
        }
        KeysCommands::Check { address, mnemonic: phrase } => {
            if let Some(address) = address {
                println!("address:  {}", if verify_address_format(&address) { "valid" } else { "invalid" });
            }
            if let Some(phrase) = phrase {
                match mnemonic::validate_mnemonic(&phrase) {
                    Ok(()) => println!("mnemonic: valid"),
                    Err(e) => println!("mnemonic: invalid ({})", e),
                }
            }
        }
    }
    Ok(())
}
