use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WalletConfig {
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Idle seconds before the session locks. 0 disables auto-lock.
    #[serde(default = "default_auto_lock_secs")]
    pub auto_lock_secs: u64,
    #[serde(default = "default_unlock_timeout_secs")]
    pub unlock_timeout_secs: u64,
    #[serde(default = "default_activity_debounce_secs")]
    pub activity_debounce_secs: u64,
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
    /// Device binding string mixed into the session key wrapping key.
    #[serde(default = "default_device_label")]
    pub device_label: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

pub const DEFAULT_AUTO_LOCK_SECS: u64 = 300;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;
pub const MAX_WALLETS: usize = 5;

fn default_auto_lock_secs() -> u64 {
    DEFAULT_AUTO_LOCK_SECS
}

fn default_unlock_timeout_secs() -> u64 {
    10
}

fn default_activity_debounce_secs() -> u64 {
    3
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

fn default_device_label() -> String {
    format!("octra-wallet/{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS)
}

fn default_rpc_url() -> String {
    "https://octra.network".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            auto_lock_secs: default_auto_lock_secs(),
            unlock_timeout_secs: default_unlock_timeout_secs(),
            activity_debounce_secs: default_activity_debounce_secs(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            device_label: default_device_label(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { rpc_url: default_rpc_url() }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                path: "./data/wallet".to_string(),
            },
            security: SecurityConfig::default(),
            network: NetworkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl WalletConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        info!(path, "config loaded");
                        c
                    }
                    Err(e) => {
                        warn!(path, error = %e, "error parsing config, using defaults");
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!(path, error = %e, "error reading config, using defaults");
                    Self::default()
                }
            }
        } else {
            info!(path, "config file not found, writing defaults");
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }

    /// `load_or_default` under a temporary subscriber, so its events are not
    /// lost before the configured one is installed.
    pub fn load_logged<W>(path: &str, filter: EnvFilter, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let bootstrap = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(bootstrap, || Self::load_or_default(path))
    }

    /// Small iteration counts and short timers for tests.
    pub fn for_tests() -> Self {
        let mut config = Self::default();
        config.security.pbkdf2_iterations = 10;
        config.security.device_label = "octra-wallet-test".to_string();
        config
    }

    pub fn unlock_timeout(&self) -> Duration {
        Duration::from_secs(self.security.unlock_timeout_secs)
    }

    pub fn activity_debounce_ms(&self) -> u64 {
        self.security.activity_debounce_secs * 1000
    }
}
