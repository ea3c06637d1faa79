//! Unlock state, session persistence and auto-lock timing.
//!
//! While unlocked the session holds the unlock secret in memory. A copy is
//! persisted as `encryptedSessionKey`, sealed with AES-GCM under
//! `SHA-256(device_label || base64(salt))`, so an unlocked session survives a
//! restart until the auto-lock window runs out. The device binding only keeps
//! the secret out of plain sight in storage; it is not a security boundary.

pub mod password;

use serde_json::Value;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::context::WalletContext;
use crate::crypto::aead::{NONCE_LEN, TAG_LEN};
use crate::encoding::{b64_decode, b64_encode};
use crate::error::{Result, WalletError};
use crate::storage::{
    self, StoreMap, AUTO_LOCK_DURATION, ENCRYPTED_SESSION_KEY, LAST_ACTIVITY_TIME,
    LAST_UNLOCK_TIME, WALLET_UNLOCKED,
};

use password::PasswordManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked,
}

pub struct SessionManager {
    ctx: WalletContext,
    passwords: PasswordManager,
    secret: Option<Zeroizing<String>>,
    last_activity_ms: u64,
    last_persisted_ms: u64,
    auto_lock_secs: u64,
}

impl SessionManager {
    pub fn new(ctx: WalletContext) -> Self {
        let auto_lock_secs = ctx.config.security.auto_lock_secs;
        Self {
            passwords: PasswordManager::new(ctx.clone()),
            ctx,
            secret: None,
            last_activity_ms: 0,
            last_persisted_ms: 0,
            auto_lock_secs,
        }
    }

    /// Read the persisted auto-lock duration, falling back to config.
    pub async fn load_settings(&mut self) -> Result<()> {
        if let Some(secs) = storage::get_one(self.ctx.store.as_ref(), AUTO_LOCK_DURATION)
            .await?
            .as_ref()
            .and_then(Value::as_u64)
        {
            self.auto_lock_secs = secs;
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        if self.secret.is_some() {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    /// Unlock secret, if unlocked.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.as_str())
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    // --- Auto-lock ---

    pub fn auto_lock_duration(&self) -> u64 {
        self.auto_lock_secs
    }

    /// `0` disables auto-lock.
    pub async fn set_auto_lock_duration(&mut self, secs: u64) -> Result<()> {
        let mut entries = StoreMap::new();
        entries.insert(AUTO_LOCK_DURATION.to_string(), Value::from(secs));
        self.ctx.store.set(entries).await?;
        self.auto_lock_secs = secs;
        info!(secs, "auto-lock duration set");
        Ok(())
    }

    fn expired_at(&self, last_activity_ms: u64, now_ms: u64) -> bool {
        self.auto_lock_secs > 0
            && now_ms.saturating_sub(last_activity_ms) >= self.auto_lock_secs * 1000
    }

    /// Idle for at least the auto-lock duration.
    pub fn is_expired(&self) -> bool {
        self.is_unlocked() && self.expired_at(self.last_activity_ms, self.ctx.now_ms())
    }

    /// Record activity; storage is written at most once per debounce window.
    /// Returns whether the timestamp was persisted.
    pub async fn update_last_activity(&mut self) -> Result<bool> {
        if !self.is_unlocked() {
            return Ok(false);
        }
        let now = self.ctx.now_ms();
        self.last_activity_ms = now;
        if now.saturating_sub(self.last_persisted_ms) < self.ctx.config.activity_debounce_ms() {
            return Ok(false);
        }
        let mut entries = StoreMap::new();
        entries.insert(LAST_ACTIVITY_TIME.to_string(), Value::from(now));
        self.ctx.store.set(entries).await?;
        self.last_persisted_ms = now;
        Ok(true)
    }

    // --- Transitions ---

    fn session_kek(&self, salt_b64: &str) -> Zeroizing<[u8; 32]> {
        let label = &self.ctx.config.security.device_label;
        let mut input = Zeroizing::new(Vec::with_capacity(label.len() + salt_b64.len()));
        input.extend_from_slice(label.as_bytes());
        input.extend_from_slice(salt_b64.as_bytes());
        Zeroizing::new(self.ctx.crypto.sha256(&input))
    }

    async fn salt_b64(&self) -> Result<String> {
        match storage::get_one(self.ctx.store.as_ref(), storage::SALT).await? {
            Some(Value::String(s)) => Ok(s),
            _ => Err(WalletError::NotConfigured),
        }
    }

    fn seal_secret(&self, secret: &str, salt_b64: &str) -> Result<String> {
        let kek = self.session_kek(salt_b64);
        let nonce = self.ctx.random_bytes::<NONCE_LEN>();
        let ciphertext = self.ctx.crypto.aes_gcm_encrypt(&kek[..], &nonce, secret.as_bytes())?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(b64_encode(&blob))
    }

    fn open_secret(&self, blob_b64: &str, salt_b64: &str) -> Result<Zeroizing<String>> {
        let blob = b64_decode(blob_b64)?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(WalletError::MalformedCiphertext("session key too short".to_string()));
        }
        let kek = self.session_kek(salt_b64);
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = Zeroizing::new(self.ctx.crypto.aes_gcm_decrypt(&kek[..], nonce, ciphertext)?);
        let secret = std::str::from_utf8(&plaintext)
            .map_err(|_| WalletError::MalformedCiphertext("session key is not utf-8".to_string()))?;
        Ok(Zeroizing::new(secret.to_string()))
    }

    /// Enter the unlocked state with an already verified secret.
    pub async fn begin(&mut self, secret: Zeroizing<String>) -> Result<()> {
        let salt_b64 = self.salt_b64().await?;
        let now = self.ctx.now_ms();
        let mut entries = StoreMap::new();
        entries.insert(WALLET_UNLOCKED.to_string(), Value::Bool(true));
        entries.insert(LAST_UNLOCK_TIME.to_string(), Value::from(now));
        entries.insert(LAST_ACTIVITY_TIME.to_string(), Value::from(now));
        entries.insert(
            ENCRYPTED_SESSION_KEY.to_string(),
            Value::String(self.seal_secret(&secret, &salt_b64)?),
        );
        self.ctx.store.set(entries).await?;

        self.secret = Some(secret);
        self.last_activity_ms = now;
        self.last_persisted_ms = now;
        info!("session unlocked");
        Ok(())
    }

    /// Wipe the in-memory secret, then mark the persisted session locked.
    pub async fn lock(&mut self) -> Result<()> {
        // Zeroizing clears the buffer on drop
        self.secret = None;
        self.last_activity_ms = 0;
        self.last_persisted_ms = 0;
        self.clear_persisted().await?;
        info!("session locked");
        Ok(())
    }

    async fn clear_persisted(&self) -> Result<()> {
        let mut entries = StoreMap::new();
        entries.insert(WALLET_UNLOCKED.to_string(), Value::Bool(false));
        entries.insert(ENCRYPTED_SESSION_KEY.to_string(), Value::Null);
        self.ctx.store.set(entries).await
    }

    /// Resume after a restart. No-password vaults always resume; password
    /// vaults resume only inside the auto-lock window with an intact session
    /// key. A session key that fails to decrypt or verify clears the session.
    pub async fn restore(&mut self) -> Result<Option<Zeroizing<String>>> {
        if let Some(device_secret) = self.passwords.device_secret().await? {
            self.begin(Zeroizing::new(device_secret.to_string())).await?;
            return Ok(Some(device_secret));
        }

        let got = self
            .ctx
            .store
            .get(&[WALLET_UNLOCKED, LAST_ACTIVITY_TIME, ENCRYPTED_SESSION_KEY, storage::SALT])
            .await?;
        if got.get(WALLET_UNLOCKED).and_then(Value::as_bool) != Some(true) {
            return Ok(None);
        }
        let (Some(Value::String(blob)), Some(Value::String(salt_b64))) =
            (got.get(ENCRYPTED_SESSION_KEY), got.get(storage::SALT))
        else {
            self.clear_persisted().await?;
            return Ok(None);
        };
        let last_activity = got.get(LAST_ACTIVITY_TIME).and_then(Value::as_u64).unwrap_or(0);
        let now = self.ctx.now_ms();
        if self.expired_at(last_activity, now) {
            debug!("persisted session expired");
            self.clear_persisted().await?;
            return Ok(None);
        }

        let secret = match self.open_secret(blob, salt_b64) {
            Ok(secret) => secret,
            Err(e) => {
                warn!(error = %e, "persisted session key unreadable, locking");
                self.clear_persisted().await?;
                return Ok(None);
            }
        };
        if !self.passwords.verify_secret(&secret).await? {
            warn!("persisted session key rejected, locking");
            self.clear_persisted().await?;
            return Ok(None);
        }

        self.secret = Some(Zeroizing::new(secret.to_string()));
        self.last_activity_ms = last_activity;
        self.last_persisted_ms = last_activity;
        info!("session restored");
        Ok(Some(secret))
    }

    /// Password check for the unlocked-state transition.
    pub async fn verify_password(&self, password: &str) -> Result<bool> {
        self.passwords.verify_password(password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletConfig;
    use crate::context::ManualClock;
    use serde_json::json;
    use std::sync::Arc;

    const START: u64 = 1_700_000_000_000;
    const PASSWORD: &str = "Correct Horse Battery Staple";

    async fn setup() -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let ctx = WalletContext::in_memory(WalletConfig::for_tests()).with_clock(clock.clone());
        PasswordManager::new(ctx.clone())
            .setup_password(PASSWORD)
            .await
            .unwrap();
        (SessionManager::new(ctx), clock)
    }

    #[tokio::test]
    async fn test_session_kek_vector() {
        let ctx = WalletContext::in_memory(WalletConfig::for_tests());
        let session = SessionManager::new(ctx);
        let kek = session.session_kek("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=");
        assert_eq!(
            hex::encode(&kek[..]),
            "63faa91f9a495f791fbafd2953e6de0b07236864e9f53bb5c4c5ea4a36dcae68"
        );
    }

    #[tokio::test]
    async fn test_auto_lock_boundary() {
        let (mut session, clock) = setup().await;
        session.set_auto_lock_duration(60).await.unwrap();
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();

        clock.advance_secs(59);
        assert!(!session.is_expired());
        clock.advance_secs(1);
        assert!(session.is_expired());

        session.lock().await.unwrap();
        assert!(!session.is_unlocked());
        assert!(session.secret().is_none());
    }

    #[tokio::test]
    async fn test_zero_duration_never_expires() {
        let (mut session, clock) = setup().await;
        session.set_auto_lock_duration(0).await.unwrap();
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();
        clock.advance_secs(86_400 * 30);
        assert!(!session.is_expired());
    }

    #[tokio::test]
    async fn test_activity_debounced() {
        let (mut session, clock) = setup().await;
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();

        clock.advance_secs(1);
        assert!(!session.update_last_activity().await.unwrap());
        assert_eq!(session.last_activity_ms(), START + 1000);
        let stored = storage::get_one(session.ctx.store.as_ref(), LAST_ACTIVITY_TIME).await.unwrap();
        assert_eq!(stored, Some(json!(START)));

        clock.advance_secs(2);
        assert!(session.update_last_activity().await.unwrap());
        let stored = storage::get_one(session.ctx.store.as_ref(), LAST_ACTIVITY_TIME).await.unwrap();
        assert_eq!(stored, Some(json!(START + 3000)));
    }

    #[tokio::test]
    async fn test_restore_within_window() {
        let (mut session, clock) = setup().await;
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();

        let stored = storage::get_one(session.ctx.store.as_ref(), ENCRYPTED_SESSION_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.as_str().unwrap().contains(PASSWORD));

        let mut fresh = SessionManager::new(session.ctx.clone());
        fresh.load_settings().await.unwrap();
        clock.advance_secs(10);
        let secret = fresh.restore().await.unwrap().unwrap();
        assert_eq!(secret.as_str(), PASSWORD);
        assert!(fresh.is_unlocked());
    }

    #[tokio::test]
    async fn test_restore_after_window_locks() {
        let (mut session, clock) = setup().await;
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();
        clock.advance_secs(300);

        let mut fresh = SessionManager::new(session.ctx.clone());
        assert!(fresh.restore().await.unwrap().is_none());
        assert!(!fresh.is_unlocked());
        let unlocked = storage::get_one(session.ctx.store.as_ref(), WALLET_UNLOCKED).await.unwrap();
        assert_eq!(unlocked, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_restore_tampered_session_key() {
        let (mut session, _) = setup().await;
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();

        let mut entries = StoreMap::new();
        entries.insert(ENCRYPTED_SESSION_KEY.to_string(), json!(b64_encode(&[7u8; 40])));
        session.ctx.store.set(entries).await.unwrap();

        let mut fresh = SessionManager::new(session.ctx.clone());
        assert!(fresh.restore().await.unwrap().is_none());
        let key = storage::get_one(session.ctx.store.as_ref(), ENCRYPTED_SESSION_KEY).await.unwrap();
        assert_eq!(key, Some(Value::Null));
    }

    #[tokio::test]
    async fn test_lock_persists_state() {
        let (mut session, _) = setup().await;
        session.begin(Zeroizing::new(PASSWORD.to_string())).await.unwrap();
        session.lock().await.unwrap();

        let mut fresh = SessionManager::new(session.ctx.clone());
        assert!(fresh.restore().await.unwrap().is_none());
        assert!(session.verify_password(PASSWORD).await.unwrap());
        assert!(!session.verify_password("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_password_mode_restores() {
        let ctx = WalletContext::in_memory(WalletConfig::for_tests());
        let passwords = PasswordManager::new(ctx.clone());
        let device = passwords.skip_password().await.unwrap();

        let mut session = SessionManager::new(ctx);
        let secret = session.restore().await.unwrap().unwrap();
        assert_eq!(secret.as_str(), device.as_str());
        assert!(session.is_unlocked());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_locked() {
        let store = Arc::new(crate::storage::MemoryStore::new());
        let ctx = WalletContext::new(store.clone(), WalletConfig::for_tests());
        PasswordManager::new(ctx.clone()).setup_password(PASSWORD).await.unwrap();
        let mut session = SessionManager::new(ctx);

        store.set_fail_writes(true);
        assert!(session.begin(Zeroizing::new(PASSWORD.to_string())).await.is_err());
        assert!(!session.is_unlocked());
    }
}
