//! Cryptographic primitives and the provider seam used by the vault and
//! session layers.

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keypair;

pub use keypair::{verify_with_pubkey, verify_with_pubkey_b64, KeyPair, PrivateKey};

use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Hashing, key stretching and AEAD as consumed by storage-facing code.
///
/// The default implementation is [`RustCryptoProvider`]; hosts with a
/// platform crypto API can supply their own.
pub trait CryptoProvider: Send + Sync {
    fn sha256(&self, data: &[u8]) -> [u8; 32];

    fn sha512(&self, data: &[u8]) -> [u8; 64];

    fn hmac_sha512(&self, key: &[u8], data: &[u8]) -> Result<[u8; 64]>;

    fn pbkdf2_sha256(
        &self,
        password: &[u8],
        salt: &[u8],
        rounds: u32,
        out: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<()>;

    fn pbkdf2_sha512(
        &self,
        password: &[u8],
        salt: &[u8],
        rounds: u32,
        out: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Returns `ciphertext || tag`.
    fn aes_gcm_encrypt(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    fn aes_gcm_decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        hash::sha256(data)
    }

    fn sha512(&self, data: &[u8]) -> [u8; 64] {
        hash::sha512(data)
    }

    fn hmac_sha512(&self, key: &[u8], data: &[u8]) -> Result<[u8; 64]> {
        hash::hmac_sha512(key, data)
    }

    fn pbkdf2_sha256(
        &self,
        password: &[u8],
        salt: &[u8],
        rounds: u32,
        out: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        kdf::pbkdf2_sha256(password, salt, rounds, out, cancel)
    }

    fn pbkdf2_sha512(
        &self,
        password: &[u8],
        salt: &[u8],
        rounds: u32,
        out: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        kdf::pbkdf2_sha512(password, salt, rounds, out, cancel)
    }

    fn aes_gcm_encrypt(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        aead::encrypt(key, nonce, plaintext)
    }

    fn aes_gcm_decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        aead::decrypt(key, nonce, ciphertext)
    }
}
