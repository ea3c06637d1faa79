//! Confidential balance ciphertexts.
//!
//! v2 (current): `"v2|" + base64(nonce12 || aes-256-gcm(ct || tag16))` under
//! `SHA-256("octra_encrypted_balance_v2" || private_key)`.
//!
//! v1 (legacy, decrypt only): untagged `base64(nonce16 || tag16 || enc)`,
//! a SHA-256 keystream with a truncated SHA-256 tag.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::aead::{self, NONCE_LEN, TAG_LEN};
use crate::crypto::hash::sha256_concat;
use crate::crypto::PrivateKey;
use crate::encoding::{b64_decode, b64_encode, constant_time_eq};
use crate::error::{Result, WalletError};

pub const V2_PREFIX: &str = "v2|";
const V2_KEY_SALT: &[u8] = b"octra_encrypted_balance_v2";
const V1_KEY_SALT: &[u8] = b"octra_encrypted_balance_v1";
const V1_NONCE_LEN: usize = 16;
const V1_TAG_LEN: usize = 16;

fn v2_key(private_key: &PrivateKey) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(sha256_concat(&[V2_KEY_SALT, private_key.as_bytes()]))
}

fn v1_key(private_key: &PrivateKey) -> Zeroizing<[u8; 32]> {
    // first 32 bytes of key1 || key2 is key1
    let key1 = sha256_concat(&[V1_KEY_SALT, private_key.as_bytes()]);
    Zeroizing::new(key1)
}

fn parse_amount(plaintext: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|_| WalletError::MalformedCiphertext("plaintext is not UTF-8".to_string()))?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WalletError::MalformedCiphertext("plaintext is not a decimal amount".to_string()));
    }
    text.parse::<u64>()
        .map_err(|_| WalletError::MalformedCiphertext("amount out of range".to_string()))
}

/// `"v2|" + base64(nonce || ct || tag)` of the decimal amount.
pub(crate) fn seal_amount_v2(key: &[u8], amount: u64, nonce: &[u8; NONCE_LEN]) -> Result<String> {
    let plaintext = Zeroizing::new(amount.to_string());
    let blob = aead::seal_with_nonce(key, nonce, plaintext.as_bytes())?;
    Ok(format!("{}{}", V2_PREFIX, b64_encode(&blob)))
}

pub(crate) fn open_amount_v2(key: &[u8], ciphertext: &str) -> Result<u64> {
    let body = ciphertext
        .strip_prefix(V2_PREFIX)
        .ok_or_else(|| WalletError::UnsupportedVersion(version_tag(ciphertext)))?;
    let blob = b64_decode(body)
        .map_err(|_| WalletError::MalformedCiphertext("v2 body is not base64".to_string()))?;
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(WalletError::MalformedCiphertext("v2 body too short".to_string()));
    }
    let plaintext = Zeroizing::new(aead::open(key, &blob)?);
    parse_amount(&plaintext)
}

/// `Some("vN")` if the ciphertext starts with a `vN|` tag.
fn explicit_version(ciphertext: &str) -> Option<&str> {
    let (tag, _) = ciphertext.split_once('|')?;
    let digits = tag.strip_prefix('v')?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(tag)
    } else {
        None
    }
}

fn version_tag(ciphertext: &str) -> String {
    explicit_version(ciphertext).unwrap_or("v1").to_string()
}

pub fn encrypt_balance_with_key(amount: u64, private_key: &PrivateKey) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    seal_amount_v2(&v2_key(private_key)[..], amount, &nonce)
}

/// Encrypt a balance (micro-units) under a base64 private key. Always v2.
pub fn encrypt_balance(amount: u64, private_key_b64: &str) -> Result<String> {
    let key = PrivateKey::from_b64(private_key_b64)?;
    encrypt_balance_with_key(amount, &key)
}

pub fn decrypt_balance_with_key(ciphertext: &str, private_key: &PrivateKey) -> Result<u64> {
    let ciphertext = ciphertext.trim();
    match explicit_version(ciphertext) {
        Some("v2") => open_amount_v2(&v2_key(private_key)[..], ciphertext),
        Some(other) => Err(WalletError::UnsupportedVersion(other.to_string())),
        None => decrypt_v1(ciphertext, private_key),
    }
}

pub fn decrypt_balance(ciphertext: &str, private_key_b64: &str) -> Result<u64> {
    let key = PrivateKey::from_b64(private_key_b64)?;
    decrypt_balance_with_key(ciphertext, &key)
}

fn decrypt_v1(ciphertext: &str, private_key: &PrivateKey) -> Result<u64> {
    let raw = b64_decode(ciphertext)
        .map_err(|_| WalletError::MalformedCiphertext("v1 body is not base64".to_string()))?;
    if raw.len() <= V1_NONCE_LEN + V1_TAG_LEN {
        return Err(WalletError::MalformedCiphertext("v1 body too short".to_string()));
    }
    let key = v1_key(private_key);
    let (nonce, rest) = raw.split_at(V1_NONCE_LEN);
    let (tag, encrypted) = rest.split_at(V1_TAG_LEN);

    let expected_tag = sha256_concat(&[nonce, encrypted, &key[..]]);
    if !constant_time_eq(&expected_tag[..V1_TAG_LEN], tag) {
        return Err(WalletError::AuthenticationFailed);
    }

    let mut keystream = sha256_concat(&[&key[..], nonce]);
    let plaintext: Zeroizing<Vec<u8>> = Zeroizing::new(
        encrypted
            .iter()
            .zip(keystream.iter().cycle())
            .map(|(c, k)| c ^ k)
            .collect(),
    );
    keystream.zeroize();
    parse_amount(&plaintext)
}
