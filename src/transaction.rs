//! Octra transfer transactions and their signing payload.
//!
//! The signing payload is compact JSON of the fixed schema fields in declared
//! order (`from`, `to_`, `amount`, `nonce`, `ou`, `timestamp`) followed by any
//! unknown fields in lexicographic key order. `message`, `signature` and
//! `public_key` never enter the payload. Signer and verifier share this one
//! serializer, so a signature produced here verifies against any transaction
//! object that carries the same fields, whatever order they arrived in.
//!
//! Numbers keep the exact token they were parsed from (`arbitrary_precision`),
//! so `1700000000.50` is signed as `1700000000.50`, not `1700000000.5`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::address::ensure_address;
use crate::crypto::hash::sha256_hex;
use crate::crypto::{verify_with_pubkey_b64, KeyPair};
use crate::error::{Result, WalletError};

pub const MICRO_UNITS_PER_OCT: f64 = 1_000_000.0;
pub const MAX_MESSAGE_BYTES: usize = 1024;
/// Transfers below this amount (in OCT) use the low operation-unit tier.
pub const OU_THRESHOLD_OCT: f64 = 1000.0;

/// Keys stripped before signing.
const UNSIGNED_KEYS: [&str; 3] = ["message", "signature", "public_key"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    #[serde(rename = "to_")]
    pub to: String,
    /// Micro-units as a decimal string.
    pub amount: String,
    pub nonce: u64,
    pub ou: String,
    pub timestamp: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct SigningPayload<'a> {
    from: &'a str,
    #[serde(rename = "to_")]
    to: &'a str,
    amount: &'a str,
    nonce: u64,
    ou: &'a str,
    timestamp: &'a Number,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

/// Detached signature and hash of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub signature_b64: String,
    pub hash_hex: String,
}

/// Transaction plus the fields the node needs to check it. Parse incoming
/// envelopes with [`Transaction::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub tx: Transaction,
    pub signature: String,
    pub public_key: String,
}

/// Informational network fee in OCT.
pub fn fee_for(amount_oct: f64) -> f64 {
    if amount_oct < OU_THRESHOLD_OCT {
        0.001
    } else {
        0.003
    }
}

pub fn ou_for(amount_oct: f64) -> &'static str {
    if amount_oct < OU_THRESHOLD_OCT {
        "1"
    } else {
        "3"
    }
}

/// Whole seconds become an integer token, as a JavaScript client writes them.
fn timestamp_number(secs: f64) -> Result<Number> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(WalletError::BadInputFormat(format!("invalid timestamp: {}", secs)));
    }
    if secs.fract() == 0.0 && secs <= u64::MAX as f64 {
        return Ok(Number::from(secs as u64));
    }
    Number::from_f64(secs)
        .ok_or_else(|| WalletError::BadInputFormat(format!("invalid timestamp: {}", secs)))
}

/// Longest prefix of `message` that fits in `MAX_MESSAGE_BYTES`.
fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_BYTES {
        return message.to_string();
    }
    let mut end = MAX_MESSAGE_BYTES;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

impl Transaction {
    /// Build a transfer of `amount_oct` OCT.
    pub fn transfer(
        from: &str,
        to: &str,
        amount_oct: f64,
        nonce: u64,
        timestamp_secs: f64,
        message: Option<&str>,
    ) -> Result<Self> {
        ensure_address(from)?;
        ensure_address(to)?;
        if !amount_oct.is_finite() || amount_oct < 0.0 {
            return Err(WalletError::BadInputFormat(format!("invalid amount: {}", amount_oct)));
        }
        let micro = (amount_oct * MICRO_UNITS_PER_OCT).trunc();
        if micro > u64::MAX as f64 {
            return Err(WalletError::BadInputFormat(format!("amount too large: {}", amount_oct)));
        }
        let timestamp = timestamp_number(timestamp_secs)?;

        Ok(Transaction {
            from: from.to_string(),
            to: to.to_string(),
            amount: (micro as u64).to_string(),
            nonce,
            ou: ou_for(amount_oct).to_string(),
            timestamp,
            message: message.filter(|m| !m.is_empty()).map(truncate_message),
            extra: BTreeMap::new(),
        })
    }

    /// Parse a transaction object. Envelope keys (`signature`, `public_key`)
    /// are discarded.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut tx: Transaction = serde_json::from_value(value)
            .map_err(|e| WalletError::BadInputFormat(format!("transaction: {}", e)))?;
        tx.extra.retain(|k, _| !UNSIGNED_KEYS.contains(&k.as_str()));
        Ok(tx)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| WalletError::BadInputFormat(format!("transaction: {}", e)))?;
        Self::from_value(value)
    }

    pub fn canonical_payload(&self) -> Result<String> {
        let payload = SigningPayload {
            from: &self.from,
            to: &self.to,
            amount: &self.amount,
            nonce: self.nonce,
            ou: &self.ou,
            timestamp: &self.timestamp,
            extra: &self.extra,
        };
        Ok(serde_json::to_string(&payload)?)
    }

    /// Lowercase hex SHA-256 of the canonical payload.
    pub fn hash(&self) -> Result<String> {
        Ok(sha256_hex(self.canonical_payload()?.as_bytes()))
    }

    pub fn sign(&self, keypair: &KeyPair) -> Result<TxSignature> {
        let payload = self.canonical_payload()?;
        Ok(TxSignature {
            signature_b64: keypair.sign_b64(payload.as_bytes()),
            hash_hex: sha256_hex(payload.as_bytes()),
        })
    }

    pub fn into_signed(self, keypair: &KeyPair) -> Result<SignedTransaction> {
        let sig = self.sign(keypair)?;
        Ok(SignedTransaction {
            tx: self,
            signature: sig.signature_b64,
            public_key: keypair.public_key_b64(),
        })
    }
}

pub fn sign_transaction(tx: &Transaction, keypair: &KeyPair) -> Result<TxSignature> {
    tx.sign(keypair)
}

/// `false` on any decoding problem as well as a bad signature.
pub fn verify_signature(tx: &Transaction, signature_b64: &str, public_key_b64: &str) -> bool {
    match tx.canonical_payload() {
        Ok(payload) => verify_with_pubkey_b64(payload.as_bytes(), signature_b64, public_key_b64),
        Err(_) => false,
    }
}

impl SignedTransaction {
    pub fn verify(&self) -> bool {
        verify_signature(&self.tx, &self.signature, &self.public_key)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
