//! Shared secret for private transfers.
//!
//! Both parties hash the two public keys in byte order, so either side can
//! derive the same 32 bytes from its own private key and the other's public
//! key. Amount ciphertexts use the v2 balance framing keyed by that secret.

use std::cmp::Ordering;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::balance::{open_amount_v2, seal_amount_v2};
use crate::crypto::aead::NONCE_LEN;
use crate::crypto::hash::sha256_concat;
use crate::crypto::keypair::PUBLIC_KEY_LEN;
use crate::crypto::{KeyPair, PrivateKey};
use crate::encoding::{b64_decode_fixed, compare_bytes};
use crate::error::Result;

const SYMMETRIC_DOMAIN: &[u8] = b"OCTRA_SYMMETRIC_V1";

pub type SharedSecret = Zeroizing<[u8; 32]>;

pub fn shared_secret_from_keys(
    private_key: &PrivateKey,
    other_public_key: &[u8; PUBLIC_KEY_LEN],
) -> SharedSecret {
    let own_public_key = KeyPair::from_private_key(private_key).public_key();
    let (smaller, larger) = match compare_bytes(&own_public_key, other_public_key) {
        Ordering::Greater => (&other_public_key[..], &own_public_key[..]),
        _ => (&own_public_key[..], &other_public_key[..]),
    };
    let round1 = Zeroizing::new(sha256_concat(&[smaller, larger]));
    Zeroizing::new(sha256_concat(&[&round1[..], SYMMETRIC_DOMAIN]))
}

pub fn derive_shared_secret(my_private_key_b64: &str, ephemeral_public_key_b64: &str) -> Result<SharedSecret> {
    let private_key = PrivateKey::from_b64(my_private_key_b64)?;
    let other = b64_decode_fixed::<PUBLIC_KEY_LEN>(ephemeral_public_key_b64)?;
    Ok(shared_secret_from_keys(&private_key, &other))
}

pub fn encrypt_private_amount(amount: u64, secret: &[u8; 32]) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    seal_amount_v2(secret, amount, &nonce)
}

pub fn decrypt_private_amount(ciphertext: &str, secret: &[u8; 32]) -> Result<u64> {
    open_amount_v2(secret, ciphertext.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalletError;

    const SEED_A_B64: &str = "ERERERERERERERERERERERERERERERERERERERERERE=";
    const SEED_B_B64: &str = "IiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiI=";
    const PUB_A_B64: &str = "0EqyMnQrtKs6E2i9RhXk5tAiSrcaAWuvhSCjMsl3hzc=";
    const PUB_B_B64: &str = "oJql9HpnWYAv+VX43C0qFKXJnSO+l/hkEn/5ODRVpPA=";
    const SHARED_HEX: &str = "6d86143500dfabab9392e4774b1c8b1bafdefc2064deb78b7a6defdbb214cbc8";

    #[test]
    fn test_public_keys_from_seeds() {
        assert_eq!(KeyPair::from_seed(&[0x11; 32]).public_key_b64(), PUB_A_B64);
        assert_eq!(KeyPair::from_seed(&[0x22; 32]).public_key_b64(), PUB_B_B64);
    }

    #[test]
    fn test_shared_secret_vector_and_symmetry() {
        let ab = derive_shared_secret(SEED_A_B64, PUB_B_B64).unwrap();
        let ba = derive_shared_secret(SEED_B_B64, PUB_A_B64).unwrap();
        assert_eq!(hex::encode(&ab[..]), SHARED_HEX);
        assert_eq!(ab[..], ba[..]);
    }

    #[test]
    fn test_symmetry_random_pairs() {
        for _ in 0..20 {
            let a = KeyPair::generate();
            let b = KeyPair::generate();
            let ab = shared_secret_from_keys(&a.private_key(), &b.public_key());
            let ba = shared_secret_from_keys(&b.private_key(), &a.public_key());
            assert_eq!(ab[..], ba[..]);
        }
    }

    #[test]
    fn test_private_amount_vector() {
        let secret = derive_shared_secret(SEED_A_B64, PUB_B_B64).unwrap();
        let ct = "v2|BwcHBwcHBwcHBwcHezwRGdbhyipiQkkFkLYmTxVMI2ITubQ=";
        assert_eq!(seal_amount_v2(&secret[..], 1_500_000, &[7u8; 12]).unwrap(), ct);
        assert_eq!(decrypt_private_amount(ct, &secret).unwrap(), 1_500_000);
    }

    #[test]
    fn test_private_amount_roundtrip_and_wrong_secret() {
        let secret = derive_shared_secret(SEED_A_B64, PUB_B_B64).unwrap();
        let ct = encrypt_private_amount(99, &secret).unwrap();
        let recv = derive_shared_secret(SEED_B_B64, PUB_A_B64).unwrap();
        assert_eq!(decrypt_private_amount(&ct, &recv).unwrap(), 99);
        assert!(matches!(
            decrypt_private_amount(&ct, &[0u8; 32]),
            Err(WalletError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_bad_inputs() {
        assert!(matches!(
            derive_shared_secret(SEED_A_B64, "AAAA"),
            Err(WalletError::BadKeyLength { .. })
        ));
        assert!(matches!(
            decrypt_private_amount("v1|abc", &[0u8; 32]),
            Err(WalletError::UnsupportedVersion(_))
        ));
    }
}
