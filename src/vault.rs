//! Encrypted wallet vault.
//!
//! Each wallet record is sealed on its own with AES-256-GCM under a key
//! stretched from the unlock secret (PBKDF2-HMAC-SHA-256, vault-wide salt).
//! The persisted list keeps a plaintext index next to every blob:
//!
//! ```text
//! encryptedWallets = [{id, name, address, createdAt, isActive, encryptedData}, ...]
//! encryptedData    = base64(nonce[12] || ciphertext || tag[16])
//! ```
//!
//! `activeWalletId` in the index is authoritative for which wallet is active;
//! the `isActive` flag sealed inside a record may lag behind it because
//! activation only rewrites the index.
//!
//! The PBKDF2 round count is written as `kdfIterations` next to `salt`, so a
//! later config change only affects vaults created after it. Entries that all
//! fail to open are moved to `quarantinedWallets` rather than deleted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::context::WalletContext;
use crate::crypto::aead::{NONCE_LEN, TAG_LEN};
use crate::crypto::kdf;
use crate::encoding::{b64_decode, b64_encode};
use crate::error::{Result, WalletError};
use crate::session::password::{PasswordManager, SALT_LEN};
use crate::storage::{
    self, StoreMap, ACTIVE_WALLET_ID, ENCRYPTED_WALLETS, KDF_ITERATIONS, QUARANTINED_WALLETS, SALT,
    WALLET_COUNT,
};
use crate::wallet::types::WalletRecord;

const VAULT_KEY_LEN: usize = 32;

/// Plaintext index entry plus the sealed record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedWalletEntry {
    pub id: String,
    pub name: String,
    pub address: String,
    pub created_at: u64,
    pub is_active: bool,
    pub encrypted_data: String,
}

/// AES key stretched from the unlock secret, with the parameters it was made with.
pub struct VaultKey {
    key: Zeroizing<[u8; VAULT_KEY_LEN]>,
    salt: [u8; SALT_LEN],
    rounds: u32,
}

impl VaultKey {
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

/// Entry that failed to decrypt or parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptedEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct VaultLoad {
    pub wallets: Vec<WalletRecord>,
    pub active_id: Option<String>,
    /// Some entries were dropped and the healthy rest re-persisted.
    pub recovered: bool,
    pub corrupted: Vec<CorruptedEntry>,
    /// Every entry was unreadable; the vault has been cleared and the
    /// entries quarantined.
    pub cleaned_up: bool,
}

#[derive(Clone)]
pub struct Vault {
    ctx: WalletContext,
    passwords: PasswordManager,
}

impl Vault {
    pub fn new(ctx: WalletContext) -> Self {
        let passwords = PasswordManager::new(ctx.clone());
        Self { ctx, passwords }
    }

    // --- Keys ---

    /// Round count the stored vault was sealed with, if it recorded one.
    pub async fn stored_rounds(&self) -> Result<Option<u32>> {
        match storage::get_one(self.ctx.store.as_ref(), KDF_ITERATIONS).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(rounds) if rounds > 0 => Ok(Some(rounds)),
                _ => Err(WalletError::VaultCorrupted(format!(
                    "bad {}: {}",
                    KDF_ITERATIONS, value
                ))),
            },
        }
    }

    /// Stretch `secret` with the stored salt and round count. Missing values
    /// get a fresh salt and the configured round count.
    pub async fn derive_key(&self, secret: &str) -> Result<VaultKey> {
        let salt = match self.passwords.salt().await? {
            Some(salt) => salt,
            None => self.ctx.random_bytes::<SALT_LEN>(),
        };
        let rounds = match self.stored_rounds().await? {
            Some(rounds) => rounds,
            None => self.ctx.config.security.pbkdf2_iterations,
        };
        self.stretch(secret, salt, rounds).await
    }

    /// Key for a new salt, using the configured round count.
    pub async fn derive_key_with_salt(&self, secret: &str, salt: [u8; SALT_LEN]) -> Result<VaultKey> {
        self.stretch(secret, salt, self.ctx.config.security.pbkdf2_iterations)
            .await
    }

    async fn stretch(&self, secret: &str, salt: [u8; SALT_LEN], rounds: u32) -> Result<VaultKey> {
        let crypto = self.ctx.crypto.clone();
        let secret = Zeroizing::new(secret.to_string());
        let key = kdf::run_blocking(move |cancel| {
            let mut key = Zeroizing::new([0u8; VAULT_KEY_LEN]);
            crypto.pbkdf2_sha256(secret.as_bytes(), &salt, rounds, &mut key[..], cancel)?;
            Ok(key)
        })
        .await?;
        Ok(VaultKey { key, salt, rounds })
    }

    // --- Record sealing ---

    fn seal_record(&self, record: &WalletRecord, key: &VaultKey, active_id: Option<&str>) -> Result<EncryptedWalletEntry> {
        let plaintext = Zeroizing::new(serde_json::to_vec(record)?);
        let nonce = self.ctx.random_bytes::<NONCE_LEN>();
        let ciphertext = self.ctx.crypto.aes_gcm_encrypt(&key.key[..], &nonce, &plaintext)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(EncryptedWalletEntry {
            id: record.id.clone(),
            name: record.name.clone(),
            address: record.address.clone(),
            created_at: record.created_at,
            is_active: active_id == Some(record.id.as_str()),
            encrypted_data: b64_encode(&blob),
        })
    }

    fn open_entry(&self, entry: &EncryptedWalletEntry, key: &VaultKey) -> Result<WalletRecord> {
        let blob = b64_decode(&entry.encrypted_data)
            .map_err(|_| WalletError::VaultCorrupted("blob is not base64".to_string()))?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(WalletError::VaultCorrupted("blob too short".to_string()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = Zeroizing::new(
            self.ctx
                .crypto
                .aes_gcm_decrypt(&key.key[..], nonce, ciphertext)?,
        );
        let record: WalletRecord = serde_json::from_slice(&plaintext)
            .map_err(|e| WalletError::VaultCorrupted(format!("record json: {}", e)))?;

        if record.id != entry.id || record.address != entry.address {
            return Err(WalletError::VaultCorrupted("index does not match record".to_string()));
        }
        if !record.is_consistent() {
            return Err(WalletError::VaultCorrupted("key material does not match address".to_string()));
        }
        Ok(record)
    }

    // --- Index persistence ---

    async fn read_index(&self) -> Result<(Vec<Value>, Option<String>)> {
        let got = self.ctx.store.get(&[ENCRYPTED_WALLETS, ACTIVE_WALLET_ID]).await?;
        let entries = match got.get(ENCRYPTED_WALLETS) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            // unreadable index: a single bogus entry so load reports and clears it
            Some(other) => vec![other.clone()],
        };
        let active = got
            .get(ACTIVE_WALLET_ID)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok((entries, active))
    }

    /// Parsed index; entries that are not well-formed objects are skipped.
    pub async fn entries(&self) -> Result<Vec<EncryptedWalletEntry>> {
        let (raw, _) = self.read_index().await?;
        Ok(raw
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    fn index_entries(
        entries: &[EncryptedWalletEntry],
        active_id: Option<&str>,
        key: Option<&VaultKey>,
    ) -> Result<StoreMap> {
        let mut map = StoreMap::new();
        map.insert(ENCRYPTED_WALLETS.to_string(), serde_json::to_value(entries)?);
        map.insert(
            ACTIVE_WALLET_ID.to_string(),
            active_id.map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        map.insert(WALLET_COUNT.to_string(), Value::from(entries.len()));
        if let Some(key) = key {
            map.insert(SALT.to_string(), Value::String(b64_encode(&key.salt)));
            map.insert(KDF_ITERATIONS.to_string(), Value::from(key.rounds));
        }
        Ok(map)
    }

    fn set_active_flags(entries: &mut [EncryptedWalletEntry], active_id: Option<&str>) {
        for entry in entries.iter_mut() {
            entry.is_active = active_id == Some(entry.id.as_str());
        }
    }

    // --- Write path ---

    /// Derive the key from `secret` and persist the full list.
    pub async fn store_wallets(&self, wallets: &[WalletRecord], secret: &str, active_id: Option<&str>) -> Result<()> {
        let key = self.derive_key(secret).await?;
        self.store_with_key(wallets, &key, active_id, StoreMap::new()).await
    }

    /// Re-seal every record and write list, index, key parameters and `extra` in one call.
    pub async fn store_with_key(
        &self,
        wallets: &[WalletRecord],
        key: &VaultKey,
        active_id: Option<&str>,
        extra: StoreMap,
    ) -> Result<()> {
        let entries = wallets
            .iter()
            .map(|w| self.seal_record(w, key, active_id))
            .collect::<Result<Vec<_>>>()?;
        let mut map = Self::index_entries(&entries, active_id, Some(key))?;
        map.extend(extra);
        self.ctx.store.set(map).await?;
        debug!(count = entries.len(), "vault stored");
        Ok(())
    }

    /// Seal one record and replace (or append) its entry; other blobs are untouched.
    pub async fn upsert_record(&self, record: &WalletRecord, key: &VaultKey, active_id: Option<&str>) -> Result<()> {
        let mut entries = self.entries().await?;
        let sealed = self.seal_record(record, key, active_id)?;
        match entries.iter_mut().find(|e| e.id == record.id) {
            Some(slot) => *slot = sealed,
            None => entries.push(sealed),
        }
        Self::set_active_flags(&mut entries, active_id);
        self.ctx
            .store
            .set(Self::index_entries(&entries, active_id, Some(key))?)
            .await?;
        debug!(id = %record.id, "vault record written");
        Ok(())
    }

    pub async fn remove_record(&self, id: &str, active_id: Option<&str>) -> Result<()> {
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(WalletError::WalletNotFound(id.to_string()));
        }
        Self::set_active_flags(&mut entries, active_id);
        self.ctx
            .store
            .set(Self::index_entries(&entries, active_id, None)?)
            .await?;
        debug!(id, "vault record removed");
        Ok(())
    }

    /// Index-only activation change; no record is re-encrypted.
    pub async fn update_index(&self, active_id: &str) -> Result<()> {
        let mut entries = self.entries().await?;
        if !entries.iter().any(|e| e.id == active_id) {
            return Err(WalletError::WalletNotFound(active_id.to_string()));
        }
        Self::set_active_flags(&mut entries, Some(active_id));
        self.ctx
            .store
            .set(Self::index_entries(&entries, Some(active_id), None)?)
            .await
    }

    /// Drop every wallet, quarantined entries included.
    pub async fn clear_all_wallets(&self) -> Result<()> {
        self.ctx
            .store
            .remove(&[ENCRYPTED_WALLETS, ACTIVE_WALLET_ID, WALLET_COUNT, QUARANTINED_WALLETS])
            .await?;
        info!("vault cleared");
        Ok(())
    }

    // --- Quarantine ---

    async fn quarantined_raw(&self) -> Result<Vec<Value>> {
        match storage::get_one(self.ctx.store.as_ref(), QUARANTINED_WALLETS).await? {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Ok(vec![other]),
        }
    }

    pub async fn quarantined_count(&self) -> Result<usize> {
        Ok(self.quarantined_raw().await?.len())
    }

    /// Move the raw index aside, then clear the live list. Nothing is lost if
    /// the second write fails: the entries exist in both places.
    async fn quarantine(&self, raw: Vec<Value>) -> Result<()> {
        let mut kept = self.quarantined_raw().await?;
        kept.extend(raw);
        let count = kept.len();
        let mut map = StoreMap::new();
        map.insert(QUARANTINED_WALLETS.to_string(), Value::Array(kept));
        self.ctx.store.set(map).await?;
        self.ctx
            .store
            .remove(&[ENCRYPTED_WALLETS, ACTIVE_WALLET_ID, WALLET_COUNT])
            .await?;
        warn!(quarantined = count, "unreadable wallets moved to quarantine");
        Ok(())
    }

    /// Put quarantined entries back into an empty vault so the next load
    /// retries them. Returns how many were restored.
    pub async fn restore_quarantined(&self) -> Result<usize> {
        let quarantined = self.quarantined_raw().await?;
        if quarantined.is_empty() {
            return Ok(0);
        }
        if !self.read_index().await?.0.is_empty() {
            return Err(WalletError::BadInputFormat(
                "vault still holds wallets; quarantine can only be restored into an empty vault"
                    .to_string(),
            ));
        }
        let count = quarantined.len();
        let mut map = StoreMap::new();
        map.insert(ENCRYPTED_WALLETS.to_string(), Value::Array(quarantined));
        map.insert(WALLET_COUNT.to_string(), Value::from(count));
        map.insert(QUARANTINED_WALLETS.to_string(), Value::Null);
        self.ctx.store.set(map).await?;
        info!(count, "quarantined wallets restored");
        Ok(count)
    }

    // --- Read path ---

    /// Check `secret`, derive the key and load. A rejected secret never
    /// touches stored data.
    pub async fn load_wallets(&self, secret: &str) -> Result<VaultLoad> {
        if self.read_index().await?.0.is_empty() {
            return Ok(VaultLoad::default());
        }
        if !self.passwords.verify_secret(secret).await? {
            return Err(WalletError::PasswordRejected);
        }
        let key = self.derive_key(secret).await?;
        self.load_with_key(&key).await
    }

    pub async fn load_with_key(&self, key: &VaultKey) -> Result<VaultLoad> {
        let (raw, stored_active) = self.read_index().await?;
        if raw.is_empty() {
            return Ok(VaultLoad::default());
        }

        let mut healthy: Vec<(EncryptedWalletEntry, WalletRecord)> = Vec::new();
        let mut corrupted = Vec::new();
        for value in raw.iter() {
            let entry: EncryptedWalletEntry = match serde_json::from_value(value.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    corrupted.push(CorruptedEntry {
                        id: value.get("id").and_then(Value::as_str).map(str::to_string),
                        name: value.get("name").and_then(Value::as_str).map(str::to_string),
                        reason: format!("malformed index entry: {}", e),
                    });
                    continue;
                }
            };
            match self.open_entry(&entry, key) {
                Ok(record) => healthy.push((entry, record)),
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "vault entry unreadable");
                    corrupted.push(CorruptedEntry {
                        id: Some(entry.id.clone()),
                        name: Some(entry.name.clone()),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if healthy.is_empty() {
            error!(count = corrupted.len(), "no vault entry could be decrypted, clearing vault");
            self.quarantine(raw).await?;
            return Ok(VaultLoad {
                corrupted,
                cleaned_up: true,
                ..VaultLoad::default()
            });
        }

        let active_id = stored_active
            .filter(|id| healthy.iter().any(|(e, _)| &e.id == id))
            .or_else(|| healthy.iter().find(|(e, _)| e.is_active).map(|(e, _)| e.id.clone()))
            .or_else(|| healthy.first().map(|(e, _)| e.id.clone()));

        let needs_repair = !corrupted.is_empty()
            || healthy
                .iter()
                .any(|(e, _)| e.is_active != (active_id.as_deref() == Some(e.id.as_str())));

        let (mut entries, mut wallets): (Vec<_>, Vec<_>) = healthy.into_iter().unzip();
        Self::set_active_flags(&mut entries, active_id.as_deref());
        for w in wallets.iter_mut() {
            w.is_active = active_id.as_deref() == Some(w.id.as_str());
        }

        if needs_repair {
            // healthy blobs are written back verbatim
            self.ctx
                .store
                .set(Self::index_entries(&entries, active_id.as_deref(), None)?)
                .await?;
            if !corrupted.is_empty() {
                warn!(
                    healthy = entries.len(),
                    dropped = corrupted.len(),
                    "vault self-healed"
                );
            }
        }

        Ok(VaultLoad {
            wallets,
            active_id,
            recovered: !corrupted.is_empty(),
            corrupted,
            cleaned_up: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletConfig;
    use crate::crypto::PrivateKey;
    use crate::storage::{self, KeyValueStore, MemoryStore};
    use crate::wallet::types::WalletSource;
    use serde_json::json;
    use std::sync::Arc;

    const PASSWORD: &str = "Correct Horse Battery Staple";

    async fn setup() -> (Vault, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = WalletContext::new(store.clone(), WalletConfig::for_tests());
        PasswordManager::new(ctx.clone())
            .setup_password(PASSWORD)
            .await
            .unwrap();
        (Vault::new(ctx), store)
    }

    fn wallet(n: u8) -> WalletRecord {
        WalletRecord::new(
            format!("w{}", n),
            format!("Wallet {}", n),
            PrivateKey::from_bytes([n; 32]),
            None,
            WalletSource::ImportedKey,
            1_700_000_000_000 + n as u64,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_load_roundtrip() {
        let (vault, _) = setup().await;
        let wallets = vec![wallet(1), wallet(2), wallet(3)];
        vault.store_wallets(&wallets, PASSWORD, Some("w2")).await.unwrap();

        let load = vault.load_wallets(PASSWORD).await.unwrap();
        assert!(!load.recovered);
        assert!(!load.cleaned_up);
        assert_eq!(load.active_id.as_deref(), Some("w2"));
        assert_eq!(load.wallets.len(), 3);
        for (a, b) in load.wallets.iter().zip(wallets.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.name, b.name);
            assert_eq!(a.address, b.address);
            assert!(a.private_key == b.private_key);
            assert_eq!(a.created_at, b.created_at);
            assert_eq!(a.is_active, a.id == "w2");
        }
    }

    #[tokio::test]
    async fn test_index_layout() {
        let (vault, store) = setup().await;
        vault.store_wallets(&[wallet(1)], PASSWORD, Some("w1")).await.unwrap();
        let got = store
            .get(&[ENCRYPTED_WALLETS, ACTIVE_WALLET_ID, WALLET_COUNT, SALT])
            .await
            .unwrap();
        assert_eq!(got[WALLET_COUNT], json!(1));
        assert_eq!(got[ACTIVE_WALLET_ID], json!("w1"));
        let entry = &got[ENCRYPTED_WALLETS][0];
        assert_eq!(entry["id"], "w1");
        assert_eq!(entry["isActive"], true);
        assert_eq!(entry["createdAt"], 1_700_000_000_001u64);
        let blob = b64_decode(entry["encryptedData"].as_str().unwrap()).unwrap();
        assert!(blob.len() > NONCE_LEN + TAG_LEN);
        assert!(!serde_json::to_string(&got).unwrap().contains(PASSWORD));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected_without_wipe() {
        let (vault, _) = setup().await;
        vault.store_wallets(&[wallet(1)], PASSWORD, None).await.unwrap();
        assert!(matches!(
            vault.load_wallets("wrong").await,
            Err(WalletError::PasswordRejected)
        ));
        assert_eq!(vault.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_middle_entry_self_heals() {
        let (vault, store) = setup().await;
        vault
            .store_wallets(&[wallet(1), wallet(2), wallet(3)], PASSWORD, Some("w1"))
            .await
            .unwrap();

        let mut list = storage::get_one(store.as_ref(), ENCRYPTED_WALLETS).await.unwrap().unwrap();
        let blob = list[1]["encryptedData"].as_str().unwrap().to_string();
        let mut raw = b64_decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        list[1]["encryptedData"] = json!(b64_encode(&raw));
        let mut entries = StoreMap::new();
        entries.insert(ENCRYPTED_WALLETS.to_string(), list);
        store.set(entries).await.unwrap();

        let load = vault.load_wallets(PASSWORD).await.unwrap();
        assert_eq!(load.wallets.len(), 2);
        assert_eq!(load.corrupted.len(), 1);
        assert_eq!(load.corrupted[0].id.as_deref(), Some("w2"));
        assert!(load.recovered);
        assert!(!load.cleaned_up);

        let again = vault.load_wallets(PASSWORD).await.unwrap();
        assert_eq!(again.wallets.len(), 2);
        assert!(!again.recovered);
        assert!(again.corrupted.is_empty());
        assert_eq!(
            storage::get_one(store.as_ref(), WALLET_COUNT).await.unwrap(),
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn test_active_corrupted_promotes_first_healthy() {
        let (vault, store) = setup().await;
        vault
            .store_wallets(&[wallet(1), wallet(2)], PASSWORD, Some("w1"))
            .await
            .unwrap();
        let mut list = storage::get_one(store.as_ref(), ENCRYPTED_WALLETS).await.unwrap().unwrap();
        list[0]["encryptedData"] = json!("!!!");
        let mut entries = StoreMap::new();
        entries.insert(ENCRYPTED_WALLETS.to_string(), list);
        store.set(entries).await.unwrap();

        let load = vault.load_wallets(PASSWORD).await.unwrap();
        assert_eq!(load.active_id.as_deref(), Some("w2"));
        assert!(load.wallets[0].is_active);
    }

    #[tokio::test]
    async fn test_all_corrupted_clears_vault() {
        let (vault, store) = setup().await;
        vault.store_wallets(&[wallet(1), wallet(2)], PASSWORD, None).await.unwrap();
        let mut entries = StoreMap::new();
        entries.insert(
            ENCRYPTED_WALLETS.to_string(),
            json!([{"id": "w1", "encryptedData": "AAAA"}, "garbage"]),
        );
        store.set(entries).await.unwrap();

        let load = vault.load_wallets(PASSWORD).await.unwrap();
        assert!(load.cleaned_up);
        assert!(load.wallets.is_empty());
        assert_eq!(load.corrupted.len(), 2);
        assert!(storage::get_one(store.as_ref(), ENCRYPTED_WALLETS).await.unwrap().is_none());
        assert_eq!(vault.quarantined_count().await.unwrap(), 2);

        vault.clear_all_wallets().await.unwrap();
        assert_eq!(vault.quarantined_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_round_count_stored_with_vault() {
        let (vault, store) = setup().await;
        vault.store_wallets(&[wallet(1)], PASSWORD, Some("w1")).await.unwrap();
        assert_eq!(
            storage::get_one(store.as_ref(), KDF_ITERATIONS).await.unwrap(),
            Some(json!(10))
        );

        let mut config = WalletConfig::for_tests();
        config.security.pbkdf2_iterations = 11;
        let reconfigured = Vault::new(WalletContext::new(store.clone(), config));
        let load = reconfigured.load_wallets(PASSWORD).await.unwrap();
        assert!(!load.cleaned_up);
        assert_eq!(load.wallets.len(), 1);
        assert_eq!(reconfigured.derive_key(PASSWORD).await.unwrap().rounds(), 10);
    }

    #[tokio::test]
    async fn test_bad_round_count_is_reported() {
        let (vault, store) = setup().await;
        vault.store_wallets(&[wallet(1)], PASSWORD, None).await.unwrap();
        let mut entries = StoreMap::new();
        entries.insert(KDF_ITERATIONS.to_string(), json!(0));
        store.set(entries).await.unwrap();
        assert!(matches!(
            vault.load_wallets(PASSWORD).await,
            Err(WalletError::VaultCorrupted(_))
        ));
        assert_eq!(vault.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_key_mismatch_quarantines_and_restores() {
        let (vault, _) = setup().await;
        let key = vault.derive_key(PASSWORD).await.unwrap();
        vault
            .store_with_key(&[wallet(1), wallet(2)], &key, Some("w2"), StoreMap::new())
            .await
            .unwrap();

        let wrong = vault.derive_key_with_salt("not it", *key.salt()).await.unwrap();
        let load = vault.load_with_key(&wrong).await.unwrap();
        assert!(load.cleaned_up);
        assert!(vault.entries().await.unwrap().is_empty());
        assert_eq!(vault.quarantined_count().await.unwrap(), 2);

        assert_eq!(vault.restore_quarantined().await.unwrap(), 2);
        assert_eq!(vault.quarantined_count().await.unwrap(), 0);
        let load = vault.load_with_key(&key).await.unwrap();
        assert_eq!(load.wallets.len(), 2);
        assert_eq!(load.active_id.as_deref(), Some("w2"));
        assert_eq!(vault.restore_quarantined().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_quarantine_refuses_live_vault() {
        let (vault, _) = setup().await;
        let key = vault.derive_key(PASSWORD).await.unwrap();
        vault
            .store_with_key(&[wallet(1)], &key, None, StoreMap::new())
            .await
            .unwrap();
        let wrong = vault.derive_key_with_salt("not it", *key.salt()).await.unwrap();
        assert!(vault.load_with_key(&wrong).await.unwrap().cleaned_up);

        vault
            .store_with_key(&[wallet(2)], &key, None, StoreMap::new())
            .await
            .unwrap();
        assert!(matches!(
            vault.restore_quarantined().await,
            Err(WalletError::BadInputFormat(_))
        ));
        assert_eq!(vault.quarantined_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_leaves_other_blobs() {
        let (vault, _) = setup().await;
        let key = vault.derive_key(PASSWORD).await.unwrap();
        vault
            .store_with_key(&[wallet(1), wallet(2)], &key, Some("w1"), StoreMap::new())
            .await
            .unwrap();
        let before = vault.entries().await.unwrap();

        let mut renamed = wallet(2);
        renamed.name = "Savings".to_string();
        vault.upsert_record(&renamed, &key, Some("w1")).await.unwrap();
        vault.upsert_record(&wallet(3), &key, Some("w1")).await.unwrap();

        let after = vault.entries().await.unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].name, "Savings");
        assert_ne!(after[1].encrypted_data, before[1].encrypted_data);

        let load = vault.load_with_key(&key).await.unwrap();
        assert_eq!(load.wallets[1].name, "Savings");
    }

    #[tokio::test]
    async fn test_index_only_activation() {
        let (vault, store) = setup().await;
        vault
            .store_wallets(&[wallet(1), wallet(2)], PASSWORD, Some("w1"))
            .await
            .unwrap();
        let before = vault.entries().await.unwrap();
        vault.update_index("w2").await.unwrap();
        let after = vault.entries().await.unwrap();
        assert_eq!(before[1].encrypted_data, after[1].encrypted_data);
        assert!(after[1].is_active && !after[0].is_active);
        assert_eq!(
            storage::get_one(store.as_ref(), ACTIVE_WALLET_ID).await.unwrap(),
            Some(json!("w2"))
        );

        let load = vault.load_wallets(PASSWORD).await.unwrap();
        assert_eq!(load.active_id.as_deref(), Some("w2"));
        assert!(!load.recovered);
        assert!(matches!(vault.update_index("nope").await, Err(WalletError::WalletNotFound(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_vault_unchanged() {
        let (vault, store) = setup().await;
        vault.store_wallets(&[wallet(1)], PASSWORD, Some("w1")).await.unwrap();
        let before = vault.entries().await.unwrap();
        store.set_fail_writes(true);
        assert!(matches!(
            vault.store_wallets(&[wallet(1), wallet(2)], PASSWORD, Some("w1")).await,
            Err(WalletError::StorageFailure(_))
        ));
        store.set_fail_writes(false);
        assert_eq!(vault.entries().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_empty_vault_loads_empty() {
        let (vault, _) = setup().await;
        let load = vault.load_wallets("whatever").await.unwrap();
        assert!(load.wallets.is_empty() && !load.cleaned_up && !load.recovered);
    }
}
