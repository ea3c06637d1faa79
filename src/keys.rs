//! Seed -> master key -> Ed25519 keypair -> address.

use serde::Serialize;
use zeroize::Zeroizing;

use crate::address::address_from_public_key;
use crate::crypto::hash::hmac_sha512;
use crate::crypto::{KeyPair, PrivateKey};
use crate::encoding::{b64_encode, hex_encode};
use crate::error::Result;
use crate::mnemonic;

/// HMAC key for the master derivation.
pub const MASTER_KEY_SALT: &[u8] = b"Octra seed";

const SELF_TEST_MESSAGE: &[u8] = b"octra wallet self-test";

pub struct MasterKey {
    pub private_key: PrivateKey,
    pub chain_code: Zeroizing<[u8; 32]>,
}

/// HMAC-SHA-512("Octra seed", seed): left half is the Ed25519 seed,
/// right half the chain code.
pub fn derive_master_key(seed: &[u8]) -> Result<MasterKey> {
    let digest = Zeroizing::new(hmac_sha512(MASTER_KEY_SALT, seed)?);
    let private_key = PrivateKey::from_slice(&digest[..32])?;
    let mut chain_code = Zeroizing::new([0u8; 32]);
    chain_code.copy_from_slice(&digest[32..]);
    Ok(MasterKey {
        private_key,
        chain_code,
    })
}

/// Output of wallet generation. Secret fields are wiped on drop.
pub struct GeneratedWallet {
    pub mnemonic: Zeroizing<String>,
    pub seed_hex: Zeroizing<String>,
    pub private_key_b64: Zeroizing<String>,
    pub public_key_b64: String,
    pub address: String,
    pub test_signature_valid: bool,
}

impl GeneratedWallet {
    pub fn private_key(&self) -> Result<PrivateKey> {
        PrivateKey::from_b64(&self.private_key_b64)
    }

    pub fn mnemonic_words(&self) -> Vec<String> {
        self.mnemonic.split(' ').map(str::to_string).collect()
    }
}

/// Every intermediate of the derivation, hex encoded.
#[derive(Debug, Clone, Serialize)]
pub struct DerivationReport {
    pub entropy_hex: String,
    pub mnemonic: String,
    pub seed_hex: String,
    pub master_chain_hex: String,
    pub private_key_hex: String,
    pub public_key_hex: String,
    pub address: String,
}

fn wallet_from_seed(phrase: Zeroizing<String>, seed: &[u8]) -> Result<GeneratedWallet> {
    let master = derive_master_key(seed)?;
    let keypair = KeyPair::from_private_key(&master.private_key);
    let public_key = keypair.public_key();

    let signature = keypair.sign(SELF_TEST_MESSAGE);
    let test_signature_valid = keypair.verify(SELF_TEST_MESSAGE, &signature);

    Ok(GeneratedWallet {
        mnemonic: phrase,
        seed_hex: Zeroizing::new(hex_encode(seed)),
        private_key_b64: master.private_key.to_b64(),
        public_key_b64: b64_encode(&public_key),
        address: address_from_public_key(&public_key)?,
        test_signature_valid,
    })
}

fn wallet_from_phrase(phrase: Zeroizing<String>) -> Result<GeneratedWallet> {
    let seed = mnemonic::mnemonic_to_seed(&phrase, "")?;
    wallet_from_seed(phrase, &seed[..])
}

async fn wallet_from_phrase_async(phrase: Zeroizing<String>) -> Result<GeneratedWallet> {
    let seed = mnemonic::mnemonic_to_seed_async(phrase.clone(), Zeroizing::new(String::new())).await?;
    wallet_from_seed(phrase, &seed[..])
}

/// Fresh mnemonic and the keys derived from it.
pub fn generate() -> Result<GeneratedWallet> {
    wallet_from_phrase(mnemonic::generate_mnemonic()?)
}

/// [`generate`] with the seed stretch on the blocking pool. Dropping the
/// future cancels the derivation.
pub async fn generate_async() -> Result<GeneratedWallet> {
    wallet_from_phrase_async(mnemonic::generate_mnemonic()?).await
}

/// Validate a user supplied phrase and derive the same keys as [`generate`].
pub fn restore_from_mnemonic(phrase: &str) -> Result<GeneratedWallet> {
    mnemonic::validate_mnemonic(phrase)?;
    wallet_from_phrase(mnemonic::normalize_phrase(phrase))
}

pub async fn restore_from_mnemonic_async(phrase: &str) -> Result<GeneratedWallet> {
    mnemonic::validate_mnemonic(phrase)?;
    wallet_from_phrase_async(mnemonic::normalize_phrase(phrase)).await
}

pub fn derive_from_entropy(entropy: &[u8]) -> Result<DerivationReport> {
    let phrase = mnemonic::entropy_to_mnemonic(entropy)?;
    let seed = mnemonic::mnemonic_to_seed(&phrase, "")?;
    let master = derive_master_key(&seed[..])?;
    let keypair = KeyPair::from_private_key(&master.private_key);
    let public_key = keypair.public_key();

    Ok(DerivationReport {
        entropy_hex: hex_encode(entropy),
        mnemonic: phrase.to_string(),
        seed_hex: hex_encode(&seed[..]),
        master_chain_hex: hex_encode(&master.chain_code[..]),
        private_key_hex: hex_encode(master.private_key.as_bytes()),
        public_key_hex: hex_encode(&public_key),
        address: address_from_public_key(&public_key)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_entropy_report() {
        let r = derive_from_entropy(&[0u8; 16]).unwrap();
        assert_eq!(r.entropy_hex, "00000000000000000000000000000000");
        assert!(r.mnemonic.starts_with("abandon abandon abandon"));
        assert!(r.mnemonic.ends_with("abandon about"));
        assert_eq!(
            r.seed_hex,
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
        assert_eq!(
            r.private_key_hex,
            "6d6951ff80c1bfe7eea39065bdcd42387bd25d4277d21bfa7b6f9e23c8e09c10"
        );
        assert_eq!(
            r.master_chain_hex,
            "22e54b9157c3a2656b45ce25fee32cf5692ed2ec82c30665d5f7eb9fa81da260"
        );
        assert_eq!(
            r.public_key_hex,
            "f7801589b04dfccf79c16bb59684d8ed7574fcc77413fa7b23a0b57e38765a97"
        );
        assert_eq!(r.address, "octCRus1yKzZbQoABuUhWQzcps8KhdqqQWxPzGciLgY698h");
    }

    #[test]
    fn test_restore_matches_report() {
        let w = restore_from_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap();
        assert_eq!(w.private_key_b64.as_str(), "bWlR/4DBv+fuo5Blvc1COHvSXUJ30hv6e2+eI8jgnBA=");
        assert_eq!(w.public_key_b64, "94AVibBN/M95wWu1loTY7XV0/Md0E/p7I6C1fjh2Wpc=");
        assert_eq!(w.address, "octCRus1yKzZbQoABuUhWQzcps8KhdqqQWxPzGciLgY698h");
        assert!(w.test_signature_valid);
        assert_eq!(w.mnemonic_words().len(), 12);
    }

    #[test]
    fn test_generate_is_reversible() {
        let w = generate().unwrap();
        assert!(w.test_signature_valid);
        let again = restore_from_mnemonic(&w.mnemonic).unwrap();
        assert_eq!(again.private_key_b64.as_str(), w.private_key_b64.as_str());
        assert_eq!(again.address, w.address);
        assert_eq!(w.private_key().unwrap().as_bytes().len(), 32);
    }

    #[test]
    fn test_restore_rejects_invalid_phrase() {
        assert!(restore_from_mnemonic("abandon abandon").is_err());
    }

    #[tokio::test]
    async fn test_async_paths_match_sync() {
        let phrase =
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let w = restore_from_mnemonic_async(phrase).await.unwrap();
        assert_eq!(w.address, "octCRus1yKzZbQoABuUhWQzcps8KhdqqQWxPzGciLgY698h");

        let g = generate_async().await.unwrap();
        assert_eq!(restore_from_mnemonic(&g.mnemonic).unwrap().address, g.address);
    }
}
