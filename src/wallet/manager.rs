use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::balance;
use crate::config::MAX_WALLETS;
use crate::context::WalletContext;
use crate::crypto::PrivateKey;
use crate::error::{Result, WalletError};
use crate::keys;
use crate::session::password::{PasswordManager, ProtectionMode, SALT_LEN};
use crate::session::SessionManager;
use crate::transaction::{Transaction, TxSignature};
use crate::vault::{CorruptedEntry, Vault, VaultKey, VaultLoad};

use super::types::{
    ExportedWallet, MetadataPatch, MnemonicWords, WalletRecord, WalletSource, WalletSummary,
    MAX_NAME_CHARS,
};

/// Outcome of an unlock, without key material.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockReport {
    pub wallet_count: usize,
    pub active_id: Option<String>,
    pub recovered: bool,
    pub corrupted: Vec<CorruptedEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletStatus {
    pub configured: bool,
    pub password_skipped: bool,
    pub unlocked: bool,
    pub wallet_count: usize,
    pub active_id: Option<String>,
    pub auto_lock_secs: u64,
    /// Entries set aside by a load where nothing decrypted.
    pub quarantined: usize,
}

/// Trimmed name of 1 to 30 characters, none of them control characters.
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WalletError::InvalidName("name is empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(WalletError::InvalidName(format!(
            "name longer than {} characters",
            MAX_NAME_CHARS
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(WalletError::InvalidName("name contains control characters".to_string()));
    }
    Ok(name.to_string())
}

/// Single owner of the decrypted wallet list, the active pointer and the
/// session. Every mutation is persisted before memory is updated, so a
/// failed write leaves both sides as they were.
pub struct WalletManager {
    ctx: WalletContext,
    vault: Vault,
    session: SessionManager,
    passwords: PasswordManager,
    wallets: Vec<WalletRecord>,
    active_id: Option<String>,
    vault_key: Option<VaultKey>,
}

impl WalletManager {
    pub fn new(ctx: WalletContext) -> Self {
        Self {
            vault: Vault::new(ctx.clone()),
            session: SessionManager::new(ctx.clone()),
            passwords: PasswordManager::new(ctx.clone()),
            ctx,
            wallets: Vec::new(),
            active_id: None,
            vault_key: None,
        }
    }

    /// Load settings and resume a persisted session if one is still valid.
    /// Returns whether the manager came up unlocked.
    pub async fn initialize(&mut self) -> Result<bool> {
        self.session.load_settings().await?;
        let Some(secret) = self.session.restore().await? else {
            return Ok(false);
        };
        let (key, load) = self.load_vault(&secret).await?;
        if load.cleaned_up {
            self.lock().await?;
            return Err(Self::cleared_error(&load));
        }
        self.commit(key, load);
        Ok(true)
    }

    pub async fn status(&self) -> Result<WalletStatus> {
        let mode = self.passwords.mode().await?;
        Ok(WalletStatus {
            configured: mode != ProtectionMode::Unset,
            password_skipped: mode == ProtectionMode::Skipped,
            unlocked: self.is_unlocked(),
            wallet_count: self.wallets.len(),
            active_id: self.active_id.clone(),
            auto_lock_secs: self.session.auto_lock_duration(),
            quarantined: self.vault.quarantined_count().await?,
        })
    }

    // --- Protection setup ---

    pub async fn setup_password(&mut self, password: &str) -> Result<()> {
        let secret = self.passwords.setup_password(password).await?;
        self.start_empty(secret).await
    }

    pub async fn skip_password(&mut self) -> Result<()> {
        let secret = self.passwords.skip_password().await?;
        self.start_empty(secret).await
    }

    async fn start_empty(&mut self, secret: Zeroizing<String>) -> Result<()> {
        let key = self.vault.derive_key(&secret).await?;
        self.session.begin(secret).await?;
        self.wipe_wallets();
        self.vault_key = Some(key);
        Ok(())
    }

    /// Re-encrypt every record under `new_password` and rotate the stored
    /// hash and salt in the same write.
    pub async fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        self.require_unlocked()?;
        if self.passwords.mode().await? != ProtectionMode::Password {
            return Err(WalletError::NotConfigured);
        }
        if new_password.is_empty() {
            return Err(WalletError::BadInputFormat("password must not be empty".to_string()));
        }
        if !self.session.verify_password(old_password).await? {
            return Err(WalletError::PasswordRejected);
        }

        let salt = self.ctx.random_bytes::<SALT_LEN>();
        let key = self.vault.derive_key_with_salt(new_password, salt).await?;
        let extra = self.passwords.password_entries(new_password, &salt);
        self.vault
            .store_with_key(&self.wallets, &key, self.active_id.as_deref(), extra)
            .await?;
        self.vault_key = Some(key);
        self.session.begin(Zeroizing::new(new_password.to_string())).await?;
        info!(wallets = self.wallets.len(), "password changed");
        Ok(())
    }

    // --- Lock state ---

    /// Unlock within the configured deadline.
    pub async fn unlock(&mut self, password: &str) -> Result<UnlockReport> {
        let deadline = self.ctx.config.unlock_timeout();
        self.unlock_within(password, deadline).await
    }

    /// Verify, derive and decrypt within `deadline`, then enter the unlocked
    /// state. Only the read side runs under the deadline; the session is
    /// persisted after it, so expiry leaves both memory and storage locked.
    pub async fn unlock_within(&mut self, password: &str, deadline: Duration) -> Result<UnlockReport> {
        let prepared = match tokio::time::timeout(deadline, self.prepare_unlock(password)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(ms = deadline.as_millis() as u64, "unlock timed out");
                return Err(WalletError::TimedOut);
            }
        };
        let (secret, key, load) = prepared;
        if load.cleaned_up {
            self.lock().await?;
            return Err(Self::cleared_error(&load));
        }
        self.session.begin(secret).await?;
        Ok(self.commit(key, load))
    }

    async fn prepare_unlock(&self, password: &str) -> Result<(Zeroizing<String>, VaultKey, VaultLoad)> {
        let secret = match self.passwords.mode().await? {
            ProtectionMode::Unset => return Err(WalletError::NotConfigured),
            ProtectionMode::Skipped => self
                .passwords
                .device_secret()
                .await?
                .ok_or(WalletError::NotConfigured)?,
            ProtectionMode::Password => {
                if !self.session.verify_password(password).await? {
                    warn!("unlock rejected");
                    return Err(WalletError::PasswordRejected);
                }
                Zeroizing::new(password.to_string())
            }
        };
        let (key, load) = self.load_vault(&secret).await?;
        Ok((secret, key, load))
    }

    async fn load_vault(&self, secret: &str) -> Result<(VaultKey, VaultLoad)> {
        let key = self.vault.derive_key(secret).await?;
        let load = self.vault.load_with_key(&key).await?;
        Ok((key, load))
    }

    fn cleared_error(load: &VaultLoad) -> WalletError {
        WalletError::VaultCorrupted(format!(
            "{} unreadable wallets moved to quarantine, vault cleared",
            load.corrupted.len()
        ))
    }

    /// Return quarantined entries to the vault. The manager must be locked;
    /// the next unlock retries them.
    pub async fn restore_quarantined(&mut self) -> Result<usize> {
        if self.is_unlocked() {
            return Err(WalletError::BadInputFormat(
                "lock the wallet before restoring quarantined entries".to_string(),
            ));
        }
        self.vault.restore_quarantined().await
    }

    fn commit(&mut self, key: VaultKey, load: VaultLoad) -> UnlockReport {
        let report = UnlockReport {
            wallet_count: load.wallets.len(),
            active_id: load.active_id.clone(),
            recovered: load.recovered,
            corrupted: load.corrupted,
        };
        self.wipe_wallets();
        self.wallets = load.wallets;
        self.active_id = load.active_id;
        self.vault_key = Some(key);
        info!(wallets = report.wallet_count, recovered = report.recovered, "vault unlocked");
        report
    }

    /// Wipe all key material from memory and persist the locked state.
    pub async fn lock(&mut self) -> Result<()> {
        self.wipe_wallets();
        self.vault_key = None;
        self.session.lock().await
    }

    fn wipe_wallets(&mut self) {
        for wallet in self.wallets.iter_mut() {
            wallet.private_key.wipe();
            if let Some(words) = wallet.mnemonic.as_mut() {
                words.zeroize();
            }
        }
        self.wallets.clear();
        self.active_id = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked() && self.vault_key.is_some()
    }

    fn require_unlocked(&self) -> Result<&VaultKey> {
        match (&self.vault_key, self.session.is_unlocked()) {
            (Some(key), true) => Ok(key),
            _ => Err(WalletError::Locked),
        }
    }

    /// No-password vaults accept any confirmation.
    async fn authorize(&self, password: &str) -> Result<()> {
        if self.passwords.is_password_skipped().await? {
            return Ok(());
        }
        if self.session.verify_password(password).await? {
            Ok(())
        } else {
            Err(WalletError::PasswordRejected)
        }
    }

    // --- Activity ---

    pub async fn touch(&mut self) -> Result<()> {
        self.session.update_last_activity().await.map(|_| ())
    }

    /// Lock if the idle window has elapsed. Returns whether it locked.
    pub async fn check_auto_lock(&mut self) -> Result<bool> {
        if !self.session.is_expired() {
            return Ok(false);
        }
        info!(secs = self.session.auto_lock_duration(), "idle timeout, locking");
        self.lock().await?;
        Ok(true)
    }

    pub fn auto_lock_duration(&self) -> u64 {
        self.session.auto_lock_duration()
    }

    pub async fn set_auto_lock_duration(&mut self, secs: u64) -> Result<()> {
        self.session.set_auto_lock_duration(secs).await
    }

    // --- Wallet list ---

    fn position(&self, id: &str) -> Result<usize> {
        self.wallets
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| WalletError::WalletNotFound(id.to_string()))
    }

    fn ensure_name_free(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        let wanted = name.to_lowercase();
        let taken = self
            .wallets
            .iter()
            .any(|w| Some(w.id.as_str()) != except_id && w.name.to_lowercase() == wanted);
        if taken {
            return Err(WalletError::NameConflict(name.to_string()));
        }
        Ok(())
    }

    fn admit_name(&self, name: &str) -> Result<String> {
        if self.wallets.len() >= MAX_WALLETS {
            return Err(WalletError::VaultFull(MAX_WALLETS));
        }
        let name = validate_name(name)?;
        self.ensure_name_free(&name, None)?;
        Ok(name)
    }

    fn apply_active(&mut self, active_id: Option<String>) {
        for wallet in self.wallets.iter_mut() {
            wallet.is_active = active_id.as_deref() == Some(wallet.id.as_str());
        }
        self.active_id = active_id;
    }

    async fn add_record(&mut self, mut record: WalletRecord, set_active: bool) -> Result<WalletSummary> {
        if self.wallets.iter().any(|w| w.address == record.address) {
            return Err(WalletError::AddressConflict(record.address.clone()));
        }
        let active_id = if set_active || self.active_id.is_none() {
            Some(record.id.clone())
        } else {
            self.active_id.clone()
        };
        record.is_active = active_id.as_deref() == Some(record.id.as_str());

        let key = self.require_unlocked()?;
        self.vault
            .upsert_record(&record, key, active_id.as_deref())
            .await?;

        let summary = record.summary();
        self.wallets.push(record);
        self.apply_active(active_id);
        info!(id = %summary.id, address = %summary.address, "wallet added");
        Ok(summary)
    }

    async fn replace_record(&mut self, idx: usize, record: WalletRecord) -> Result<WalletSummary> {
        let key = self.require_unlocked()?;
        self.vault
            .upsert_record(&record, key, self.active_id.as_deref())
            .await?;
        let summary = record.summary();
        self.wallets[idx] = record;
        Ok(summary)
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    // --- Wallet operations ---

    /// Generate a fresh mnemonic wallet.
    pub async fn create(&mut self, name: &str, password: &str, set_active: bool) -> Result<WalletSummary> {
        self.require_unlocked()?;
        self.authorize(password).await?;
        let name = self.admit_name(name)?;

        let generated = keys::generate_async().await?;
        if !generated.test_signature_valid {
            return Err(WalletError::AuthenticationFailed);
        }
        let record = WalletRecord::new(
            Self::new_id(),
            name,
            generated.private_key()?,
            Some(MnemonicWords::new(generated.mnemonic_words())),
            WalletSource::Generated,
            self.ctx.now_ms(),
        )?;
        self.add_record(record, set_active).await
    }

    /// Import a raw base64 private key. When `address` is given it must match
    /// the address derived from the key.
    pub async fn import(
        &mut self,
        name: &str,
        private_key_b64: &str,
        address: Option<&str>,
        password: &str,
        set_active: bool,
    ) -> Result<WalletSummary> {
        self.require_unlocked()?;
        self.authorize(password).await?;
        let name = self.admit_name(name)?;

        let private_key = PrivateKey::from_b64(private_key_b64.trim())?;
        let record = WalletRecord::new(
            Self::new_id(),
            name,
            private_key,
            None,
            WalletSource::ImportedKey,
            self.ctx.now_ms(),
        )?;
        if let Some(expected) = address {
            if expected.trim() != record.address {
                return Err(WalletError::BadInputFormat(
                    "address does not match private key".to_string(),
                ));
            }
        }
        self.add_record(record, set_active).await
    }

    pub async fn import_mnemonic(
        &mut self,
        name: &str,
        phrase: &str,
        password: &str,
        set_active: bool,
    ) -> Result<WalletSummary> {
        self.require_unlocked()?;
        self.authorize(password).await?;
        let name = self.admit_name(name)?;

        let restored = keys::restore_from_mnemonic_async(phrase).await?;
        let record = WalletRecord::new(
            Self::new_id(),
            name,
            restored.private_key()?,
            Some(MnemonicWords::new(restored.mnemonic_words())),
            WalletSource::ImportedMnemonic,
            self.ctx.now_ms(),
        )?;
        self.add_record(record, set_active).await
    }

    /// Index-only update; no record is re-encrypted.
    pub async fn set_active(&mut self, id: &str) -> Result<()> {
        self.require_unlocked()?;
        self.position(id)?;
        self.vault.update_index(id).await?;
        self.apply_active(Some(id.to_string()));
        info!(id, "active wallet changed");
        Ok(())
    }

    pub async fn update_metadata(&mut self, id: &str, patch: MetadataPatch) -> Result<WalletSummary> {
        self.require_unlocked()?;
        let idx = self.position(id)?;
        let mut record = self.wallets[idx].clone();
        if let Some(icon) = patch.icon {
            record.metadata.icon = Some(icon);
        }
        if let Some(color) = patch.color {
            record.metadata.color = Some(color);
        }
        if let Some(category) = patch.category {
            record.metadata.category = Some(category);
        }
        record.updated_at = self.ctx.now_ms();
        self.replace_record(idx, record).await
    }

    pub async fn rename(&mut self, id: &str, new_name: &str, password: &str) -> Result<WalletSummary> {
        self.require_unlocked()?;
        self.authorize(password).await?;
        let idx = self.position(id)?;
        let name = validate_name(new_name)?;
        self.ensure_name_free(&name, Some(id))?;

        let mut record = self.wallets[idx].clone();
        record.name = name;
        record.updated_at = self.ctx.now_ms();
        self.replace_record(idx, record).await
    }

    /// Remove a wallet. The last wallet cannot be deleted; removing the active
    /// wallet promotes the first remaining one.
    pub async fn delete(&mut self, id: &str, password: &str) -> Result<()> {
        self.require_unlocked()?;
        self.authorize(password).await?;
        let idx = self.position(id)?;
        if self.wallets.len() == 1 {
            return Err(WalletError::LastWallet);
        }
        let active_id = if self.active_id.as_deref() == Some(id) {
            self.wallets.iter().find(|w| w.id != id).map(|w| w.id.clone())
        } else {
            self.active_id.clone()
        };

        self.vault.remove_record(id, active_id.as_deref()).await?;
        let mut removed = self.wallets.remove(idx);
        removed.private_key.wipe();
        self.apply_active(active_id);
        info!(id, "wallet deleted");
        Ok(())
    }

    /// Copy of the full record, secrets included.
    pub fn export(&self, id: &str) -> Result<WalletRecord> {
        self.require_unlocked()?;
        Ok(self.wallets[self.position(id)?].clone())
    }

    /// `{priv, addr, rpc}` export for the Octra CLI.
    pub fn export_portable(&self, id: &str) -> Result<ExportedWallet> {
        let record = self.export(id)?;
        Ok(ExportedWallet::from_record(&record, &self.ctx.config.network.rpc_url))
    }

    pub fn list(&self) -> Vec<WalletSummary> {
        self.wallets.iter().map(WalletRecord::summary).collect()
    }

    pub fn active(&self) -> Option<WalletSummary> {
        self.active_record().ok().map(WalletRecord::summary)
    }

    fn active_record(&self) -> Result<&WalletRecord> {
        self.require_unlocked()?;
        let id = self
            .active_id
            .as_deref()
            .ok_or_else(|| WalletError::WalletNotFound("no active wallet".to_string()))?;
        Ok(&self.wallets[self.position(id)?])
    }

    // --- Signing and confidential balances ---

    /// Sign with the active wallet, which must be the sender.
    pub async fn sign_with_active(&mut self, tx: &Transaction) -> Result<TxSignature> {
        let signature = {
            let record = self.active_record()?;
            if tx.from != record.address {
                return Err(WalletError::BadInputFormat(
                    "sender is not the active wallet".to_string(),
                ));
            }
            tx.sign(&record.keypair())?
        };
        self.touch().await?;
        Ok(signature)
    }

    pub fn encrypt_balance(&self, amount: u64) -> Result<String> {
        balance::encrypt_balance_with_key(amount, &self.active_record()?.private_key)
    }

    pub fn decrypt_balance(&self, ciphertext: &str) -> Result<u64> {
        balance::decrypt_balance_with_key(ciphertext, &self.active_record()?.private_key)
    }
}
