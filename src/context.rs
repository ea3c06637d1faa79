//! Collaborators shared by the vault, session and wallet manager.
//!
//! Built once at the composition root and cloned into each subsystem.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand_core::{OsRng, RngCore};

use crate::config::WalletConfig;
use crate::crypto::{CryptoProvider, RustCryptoProvider};
use crate::error::Result;
use crate::storage::{KeyValueStore, MemoryStore, RocksStore};

/// Milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.now.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cryptographically secure byte source.
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

#[derive(Clone)]
pub struct WalletContext {
    pub store: Arc<dyn KeyValueStore>,
    pub crypto: Arc<dyn CryptoProvider>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<dyn RandomSource>,
    pub config: WalletConfig,
}

impl WalletContext {
    pub fn new(store: Arc<dyn KeyValueStore>, config: WalletConfig) -> Self {
        Self {
            store,
            crypto: Arc::new(RustCryptoProvider),
            clock: Arc::new(SystemClock),
            rng: Arc::new(OsRandom),
            config,
        }
    }

    /// RocksDB at `config.storage.path`.
    pub fn open(config: WalletConfig) -> Result<Self> {
        let store = RocksStore::open(&config.storage.path)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn in_memory(config: WalletConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn random_bytes<const N: usize>(&self) -> [u8; N] {
        let mut out = [0u8; N];
        self.rng.fill(&mut out);
        out
    }
}
