//! Wallet records and the manager that owns them.

pub mod manager;
pub mod service;
pub mod types;

pub use manager::{validate_name, UnlockReport, WalletManager, WalletStatus};
pub use service::{WalletCommand, WalletHandle, WalletService};
pub use types::{
    ExportedWallet, MetadataPatch, MnemonicWords, WalletMetadata, WalletRecord, WalletSource,
    WalletSummary,
};
