use thiserror::Error;

/// Validation failures for a BIP39 phrase or its entropy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MnemonicError {
    #[error("entropy must be 16 bytes (12 words), got {0} bytes")]
    BadEntropyLength(usize),
    #[error("mnemonic checksum does not match")]
    BadChecksum,
    #[error("unknown mnemonic word: {0}")]
    UnknownWord(String),
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Bad input format: {0}")]
    BadInputFormat(String),
    #[error("Bad key length: expected {expected} bytes, got {actual}")]
    BadKeyLength { expected: usize, actual: usize },
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Unsupported ciphertext version: {0}")]
    UnsupportedVersion(String),
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),
    #[error("Password rejected")]
    PasswordRejected,
    #[error("Wallet limit reached ({0})")]
    VaultFull(usize),
    #[error("Wallet name already in use: {0}")]
    NameConflict(String),
    #[error("Wallet address already in vault: {0}")]
    AddressConflict(String),
    #[error("Invalid wallet name: {0}")]
    InvalidName(String),
    #[error("Vault corrupted: {0}")]
    VaultCorrupted(String),
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("Cannot delete the last wallet")]
    LastWallet,
    #[error("Wallet is locked")]
    Locked,
    #[error("Password protection already configured")]
    AlreadyConfigured,
    #[error("Password protection not configured")]
    NotConfigured,
    #[error("Operation timed out")]
    TimedOut,
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Mnemonic error: {0}")]
    Mnemonic(#[from] MnemonicError),
    #[error("Storage error: {0}")]
    StorageFailure(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WalletError>;

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(e.to_string())
    }
}

impl From<base64::DecodeError> for WalletError {
    fn from(e: base64::DecodeError) -> Self {
        WalletError::BadInputFormat(format!("base64: {}", e))
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(e: hex::FromHexError) -> Self {
        WalletError::BadInputFormat(format!("hex: {}", e))
    }
}

impl From<rocksdb::Error> for WalletError {
    fn from(e: rocksdb::Error) -> Self {
        WalletError::StorageFailure(e.to_string())
    }
}
