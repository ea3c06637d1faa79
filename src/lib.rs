pub mod address;
pub mod balance;
pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod private_transfer;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod vault;
pub mod wallet;

pub use context::WalletContext;
pub use error::{Result, WalletError};
