use async_trait::async_trait;
use rocksdb::{Options, WriteBatch, DB};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, WalletError};

pub type StoreMap = HashMap<String, Value>;

// --- Persisted keys ---

pub const SALT: &str = "salt";
pub const KDF_ITERATIONS: &str = "kdfIterations";
pub const HASHED_PASSWORD: &str = "hashedPassword";
pub const PASSWORD_SKIPPED: &str = "passwordSkipped";
pub const DEVICE_ENCRYPTION_KEY: &str = "deviceEncryptionKey";
pub const ENCRYPTED_WALLETS: &str = "encryptedWallets";
pub const QUARANTINED_WALLETS: &str = "quarantinedWallets";
pub const ACTIVE_WALLET_ID: &str = "activeWalletId";
pub const WALLET_COUNT: &str = "walletCount";
pub const WALLET_UNLOCKED: &str = "walletUnlocked";
pub const LAST_UNLOCK_TIME: &str = "lastUnlockTime";
pub const LAST_ACTIVITY_TIME: &str = "lastActivityTime";
pub const ENCRYPTED_SESSION_KEY: &str = "encryptedSessionKey";
pub const AUTO_LOCK_DURATION: &str = "autoLockDuration";

/// Opaque key -> JSON value store. Every call is atomic: a `set` or
/// `remove` either applies all of its keys or none.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Missing keys are absent from the returned map.
    async fn get(&self, keys: &[&str]) -> Result<StoreMap>;

    async fn set(&self, entries: StoreMap) -> Result<()>;

    async fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Read a single key.
pub async fn get_one(store: &dyn KeyValueStore, key: &str) -> Result<Option<Value>> {
    Ok(store.get(&[key]).await?.remove(key))
}

// --- In-memory ---

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreMap>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `set`/`remove` calls fail without touching data.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WalletError::StorageFailure("write rejected".to_string()));
        }
        Ok(())
    }

    fn data(&self) -> Result<std::sync::MutexGuard<'_, StoreMap>> {
        self.data
            .lock()
            .map_err(|_| WalletError::StorageFailure("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let data = self.data()?;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: StoreMap) -> Result<()> {
        self.check_writable()?;
        self.data()?.extend(entries);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        self.check_writable()?;
        let mut data = self.data()?;
        for k in keys {
            data.remove(*k);
        }
        Ok(())
    }
}

// --- RocksDB ---

pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    pub fn open(path: &str) -> Result<Self> {
        let path = Path::new(path);
        std::fs::create_dir_all(path).map_err(|e| WalletError::StorageFailure(e.to_string()))?;
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        Ok(RocksStore { db: Arc::new(db) })
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WalletError::StorageFailure(e.to_string()))?
}

#[async_trait]
impl KeyValueStore for RocksStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let db = self.db.clone();
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        blocking(move || {
            let mut out = StoreMap::new();
            for key in keys {
                if let Some(raw) = db.get(key.as_bytes())? {
                    let value: Value = serde_json::from_slice(&raw)
                        .map_err(|e| WalletError::StorageFailure(format!("{}: {}", key, e)))?;
                    out.insert(key, value);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn set(&self, entries: StoreMap) -> Result<()> {
        let db = self.db.clone();
        blocking(move || {
            let mut batch = WriteBatch::default();
            for (key, value) in &entries {
                batch.put(key.as_bytes(), serde_json::to_vec(value)?);
            }
            db.write(batch)?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let db = self.db.clone();
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        blocking(move || {
            let mut batch = WriteBatch::default();
            for key in &keys {
                batch.delete(key.as_bytes());
            }
            db.write(batch)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn exercise(store: &dyn KeyValueStore) {
        let mut entries = StoreMap::new();
        entries.insert(SALT.to_string(), json!("c2FsdA=="));
        entries.insert(WALLET_COUNT.to_string(), json!(2));
        entries.insert(ENCRYPTED_WALLETS.to_string(), json!([{"id": "a"}]));
        store.set(entries).await.unwrap();

        let got = store.get(&[SALT, WALLET_COUNT, "missing"]).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[WALLET_COUNT], json!(2));
        assert_eq!(get_one(store, ENCRYPTED_WALLETS).await.unwrap(), Some(json!([{"id": "a"}])));

        store.remove(&[SALT, WALLET_COUNT]).await.unwrap();
        assert!(get_one(store, SALT).await.unwrap().is_none());
        assert!(get_one(store, ENCRYPTED_WALLETS).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_store_failed_write_leaves_data() {
        let store = MemoryStore::new();
        let mut entries = StoreMap::new();
        entries.insert(SALT.to_string(), json!("x"));
        store.set(entries.clone()).await.unwrap();

        store.set_fail_writes(true);
        entries.insert(SALT.to_string(), json!("y"));
        assert!(matches!(store.set(entries).await, Err(WalletError::StorageFailure(_))));
        assert!(store.remove(&[SALT]).await.is_err());
        assert_eq!(get_one(&store, SALT).await.unwrap(), Some(json!("x")));
    }

    #[tokio::test]
    async fn test_rocks_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().to_str().unwrap()).unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_rocks_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        {
            let store = RocksStore::open(&path).unwrap();
            let mut entries = StoreMap::new();
            entries.insert(AUTO_LOCK_DURATION.to_string(), json!(60));
            store.set(entries).await.unwrap();
        }
        let store = RocksStore::open(&path).unwrap();
        assert_eq!(get_one(&store, AUTO_LOCK_DURATION).await.unwrap(), Some(json!(60)));
    }
}
