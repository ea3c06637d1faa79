use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::address::address_from_public_key;
use crate::crypto::{KeyPair, PrivateKey};
use crate::encoding::b64_encode;
use crate::error::Result;

pub const MAX_NAME_CHARS: usize = 30;
pub const RECORD_VERSION: u32 = 1;

/// How a wallet entered the vault.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalletSource {
    #[default]
    Generated,
    ImportedKey,
    ImportedMnemonic,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletMetadata {
    #[serde(default)]
    pub source: WalletSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl Default for WalletMetadata {
    fn default() -> Self {
        Self {
            source: WalletSource::Generated,
            icon: None,
            color: None,
            category: None,
            version: RECORD_VERSION,
        }
    }
}

/// Partial update of the cosmetic metadata fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataPatch {
    pub icon: Option<String>,
    pub color: Option<String>,
    pub category: Option<String>,
}

/// Ordered recovery words; wiped on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct MnemonicWords(Vec<String>);

impl MnemonicWords {
    pub fn new(words: Vec<String>) -> Self {
        MnemonicWords(words)
    }

    pub fn words(&self) -> &[String] {
        &self.0
    }

    pub fn phrase(&self) -> zeroize::Zeroizing<String> {
        zeroize::Zeroizing::new(self.0.join(" "))
    }
}

impl std::fmt::Debug for MnemonicWords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MnemonicWords(<{} words>)", self.0.len())
    }
}

/// Decrypted wallet. This is the JSON sealed inside each vault entry.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub private_key: PrivateKey,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<MnemonicWords>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub metadata: WalletMetadata,
}

impl WalletRecord {
    pub fn new(
        id: String,
        name: String,
        private_key: PrivateKey,
        mnemonic: Option<MnemonicWords>,
        source: WalletSource,
        now_ms: u64,
    ) -> Result<Self> {
        let public_key = KeyPair::from_private_key(&private_key).public_key();
        Ok(WalletRecord {
            id,
            name,
            address: address_from_public_key(&public_key)?,
            private_key,
            public_key: b64_encode(&public_key),
            mnemonic,
            created_at: now_ms,
            updated_at: now_ms,
            is_active: false,
            metadata: WalletMetadata {
                source,
                ..WalletMetadata::default()
            },
        })
    }

    pub fn keypair(&self) -> KeyPair {
        KeyPair::from_private_key(&self.private_key)
    }

    /// Public key and address agree with the private key.
    pub fn is_consistent(&self) -> bool {
        let public_key = self.keypair().public_key();
        b64_encode(&public_key) == self.public_key
            && address_from_public_key(&public_key).map_or(false, |a| a == self.address)
    }

    pub fn summary(&self) -> WalletSummary {
        WalletSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            public_key: self.public_key.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_active: self.is_active,
            has_mnemonic: self.mnemonic.is_some(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Secret-free view of a wallet handed to callers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub id: String,
    pub name: String,
    pub address: String,
    pub public_key: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub is_active: bool,
    pub has_mnemonic: bool,
    pub metadata: WalletMetadata,
}

/// Portable export consumed by the Octra CLI: `{priv, addr, rpc}`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExportedWallet {
    #[serde(rename = "priv")]
    pub private_key: String,
    #[serde(rename = "addr")]
    pub address: String,
    pub rpc: String,
}

impl ExportedWallet {
    pub fn from_record(record: &WalletRecord, rpc_url: &str) -> Self {
        ExportedWallet {
            private_key: record.private_key.to_b64().to_string(),
            address: record.address.clone(),
            rpc: rpc_url.to_string(),
        }
    }
}

impl Drop for ExportedWallet {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}
