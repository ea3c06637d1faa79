//! Password setup and verification.
//!
//! The vault is protected either by a user password or, when the user opts
//! out, by a random per-install device key. Either way the unlock secret is a
//! string: the password itself, or the base64 of the device key.

use serde_json::Value;
use tracing::info;
use zeroize::Zeroizing;

use crate::context::WalletContext;
use crate::crypto::CryptoProvider;
use crate::encoding::{b64_decode_fixed, b64_encode, constant_time_eq};
use crate::error::{Result, WalletError};
use crate::storage::{
    self, StoreMap, DEVICE_ENCRYPTION_KEY, HASHED_PASSWORD, PASSWORD_SKIPPED, SALT,
};

pub const SALT_LEN: usize = 32;
pub const DEVICE_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    /// Nothing configured yet.
    Unset,
    Password,
    /// Vault encrypted under the device key.
    Skipped,
}

/// Hex SHA-256 of `password || base64(salt)`.
pub fn hash_password(crypto: &dyn CryptoProvider, password: &str, salt_b64: &str) -> String {
    let mut input = Zeroizing::new(Vec::with_capacity(password.len() + salt_b64.len()));
    input.extend_from_slice(password.as_bytes());
    input.extend_from_slice(salt_b64.as_bytes());
    hex::encode(crypto.sha256(&input))
}

#[derive(Clone)]
pub struct PasswordManager {
    ctx: WalletContext,
}

impl PasswordManager {
    pub fn new(ctx: WalletContext) -> Self {
        Self { ctx }
    }

    pub async fn mode(&self) -> Result<ProtectionMode> {
        let got = self.ctx.store.get(&[HASHED_PASSWORD, PASSWORD_SKIPPED]).await?;
        if got.get(PASSWORD_SKIPPED).and_then(Value::as_bool) == Some(true) {
            return Ok(ProtectionMode::Skipped);
        }
        match got.get(HASHED_PASSWORD) {
            Some(Value::String(_)) => Ok(ProtectionMode::Password),
            _ => Ok(ProtectionMode::Unset),
        }
    }

    pub async fn is_password_skipped(&self) -> Result<bool> {
        Ok(self.mode().await? == ProtectionMode::Skipped)
    }

    pub async fn salt(&self) -> Result<Option<[u8; SALT_LEN]>> {
        match storage::get_one(self.ctx.store.as_ref(), SALT).await? {
            Some(Value::String(s)) => Ok(Some(b64_decode_fixed::<SALT_LEN>(&s)?)),
            Some(_) => Err(WalletError::VaultCorrupted("salt is not a string".to_string())),
            None => Ok(None),
        }
    }

    async fn salt_or_new(&self) -> Result<[u8; SALT_LEN]> {
        match self.salt().await? {
            Some(salt) => Ok(salt),
            None => Ok(self.ctx.random_bytes::<SALT_LEN>()),
        }
    }

    /// Store entries that make `password` the vault password.
    pub fn password_entries(&self, password: &str, salt: &[u8; SALT_LEN]) -> StoreMap {
        let salt_b64 = b64_encode(salt);
        let mut entries = StoreMap::new();
        entries.insert(
            HASHED_PASSWORD.to_string(),
            Value::String(hash_password(self.ctx.crypto.as_ref(), password, &salt_b64)),
        );
        entries.insert(SALT.to_string(), Value::String(salt_b64));
        entries.insert(PASSWORD_SKIPPED.to_string(), Value::Bool(false));
        entries
    }

    /// First-run password setup. Returns the unlock secret.
    pub async fn setup_password(&self, password: &str) -> Result<Zeroizing<String>> {
        if password.is_empty() {
            return Err(WalletError::BadInputFormat("password must not be empty".to_string()));
        }
        if self.mode().await? != ProtectionMode::Unset {
            return Err(WalletError::AlreadyConfigured);
        }
        let salt = self.salt_or_new().await?;
        self.ctx.store.set(self.password_entries(password, &salt)).await?;
        info!("password configured");
        Ok(Zeroizing::new(password.to_string()))
    }

    /// Opt out of a password; the vault is keyed by a fresh device key.
    pub async fn skip_password(&self) -> Result<Zeroizing<String>> {
        if self.mode().await? != ProtectionMode::Unset {
            return Err(WalletError::AlreadyConfigured);
        }
        let salt = self.salt_or_new().await?;
        let device_key = Zeroizing::new(self.ctx.random_bytes::<DEVICE_KEY_LEN>());
        let secret = Zeroizing::new(b64_encode(&device_key[..]));

        let mut entries = StoreMap::new();
        entries.insert(SALT.to_string(), Value::String(b64_encode(&salt)));
        entries.insert(DEVICE_ENCRYPTION_KEY.to_string(), Value::String(secret.to_string()));
        entries.insert(PASSWORD_SKIPPED.to_string(), Value::Bool(true));
        self.ctx.store.set(entries).await?;
        info!("password skipped, vault bound to device key");
        Ok(secret)
    }

    /// Unlock secret in no-password mode.
    pub async fn device_secret(&self) -> Result<Option<Zeroizing<String>>> {
        if !self.is_password_skipped().await? {
            return Ok(None);
        }
        match storage::get_one(self.ctx.store.as_ref(), DEVICE_ENCRYPTION_KEY).await? {
            Some(Value::String(s)) => {
                b64_decode_fixed::<DEVICE_KEY_LEN>(&s)?;
                Ok(Some(Zeroizing::new(s)))
            }
            _ => Err(WalletError::VaultCorrupted("device key missing".to_string())),
        }
    }

    /// Constant-time check of `password` against the stored hash.
    pub async fn verify_password(&self, password: &str) -> Result<bool> {
        let got = self.ctx.store.get(&[HASHED_PASSWORD, SALT, PASSWORD_SKIPPED]).await?;
        if got.get(PASSWORD_SKIPPED).and_then(Value::as_bool) == Some(true) {
            return Ok(false);
        }
        let (Some(Value::String(stored)), Some(Value::String(salt_b64))) =
            (got.get(HASHED_PASSWORD), got.get(SALT))
        else {
            return Ok(false);
        };
        let supplied = hash_password(self.ctx.crypto.as_ref(), password, salt_b64);
        Ok(constant_time_eq(supplied.as_bytes(), stored.as_bytes()))
    }

    /// Whether `secret` unlocks the vault in the current mode.
    pub async fn verify_secret(&self, secret: &str) -> Result<bool> {
        match self.mode().await? {
            ProtectionMode::Password => self.verify_password(secret).await,
            ProtectionMode::Skipped => match self.device_secret().await? {
                Some(device) => Ok(constant_time_eq(device.as_bytes(), secret.as_bytes())),
                None => Ok(false),
            },
            ProtectionMode::Unset => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletConfig;
    use crate::crypto::RustCryptoProvider;
    use serde_json::json;

    const SALT_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn ctx() -> WalletContext {
        WalletContext::in_memory(WalletConfig::for_tests())
    }

    #[test]
    fn test_hash_vector() {
        assert_eq!(
            hash_password(&RustCryptoProvider, "Correct Horse Battery Staple", SALT_B64),
            "81541c0d59000eeb691375609ce32098a07291fc1c7f33d033d9d4fe90b80b6e"
        );
    }

    #[tokio::test]
    async fn test_setup_and_verify() {
        let ctx = ctx();
        let pm = PasswordManager::new(ctx.clone());
        assert_eq!(pm.mode().await.unwrap(), ProtectionMode::Unset);
        assert!(!pm.verify_password("anything").await.unwrap());

        pm.setup_password("hunter22").await.unwrap();
        assert_eq!(pm.mode().await.unwrap(), ProtectionMode::Password);
        assert!(pm.verify_password("hunter22").await.unwrap());
        assert!(!pm.verify_password("hunter23").await.unwrap());
        assert!(pm.verify_secret("hunter22").await.unwrap());
        assert!(matches!(
            pm.setup_password("again").await,
            Err(WalletError::AlreadyConfigured)
        ));
        assert!(pm.salt().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_setup_uses_existing_salt() {
        let ctx = ctx();
        let mut entries = StoreMap::new();
        entries.insert(SALT.to_string(), json!(SALT_B64));
        ctx.store.set(entries).await.unwrap();

        let pm = PasswordManager::new(ctx.clone());
        pm.setup_password("Correct Horse Battery Staple").await.unwrap();
        let stored = storage::get_one(ctx.store.as_ref(), HASHED_PASSWORD).await.unwrap();
        assert_eq!(
            stored,
            Some(json!("81541c0d59000eeb691375609ce32098a07291fc1c7f33d033d9d4fe90b80b6e"))
        );
    }

    #[tokio::test]
    async fn test_skip_password_device_key() {
        let pm = PasswordManager::new(ctx());
        let secret = pm.skip_password().await.unwrap();
        assert_eq!(pm.mode().await.unwrap(), ProtectionMode::Skipped);
        assert_eq!(pm.device_secret().await.unwrap().unwrap().as_str(), secret.as_str());
        assert!(pm.verify_secret(&secret).await.unwrap());
        assert!(!pm.verify_secret("guess").await.unwrap());
        assert!(!pm.verify_password(&secret).await.unwrap());
        assert!(pm.skip_password().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_password_rejected() {
        let pm = PasswordManager::new(ctx());
        assert!(matches!(pm.setup_password("").await, Err(WalletError::BadInputFormat(_))));
    }
}
