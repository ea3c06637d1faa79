//! Text codecs and byte comparators shared by the wallet core.
//!
//! Base64 is the standard alphabet with padding, base58 uses the Bitcoin
//! alphabet, hex output is lowercase.

use std::cmp::Ordering;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use subtle::ConstantTimeEq;

use crate::error::{Result, WalletError};

pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn hex_decode(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(s)?)
}

pub fn b64_encode(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>> {
    Ok(B64.decode(s.trim())?)
}

/// Base58 (Bitcoin alphabet). Leading zero bytes become `'1'`.
pub fn b58_encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

pub fn b58_decode(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| WalletError::BadInputFormat(format!("base58: {}", e)))
}

/// Decode base64 into exactly `N` bytes.
pub fn b64_decode_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = b64_decode(s)?;
    if bytes.len() != N {
        return Err(WalletError::BadKeyLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Lexicographic byte order; a strict prefix sorts first.
pub fn compare_bytes(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Equality whose timing depends only on the lengths of the inputs.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
