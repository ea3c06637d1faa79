//! `oct` + base58(SHA-256(public_key)) addresses.

use crate::crypto::hash::sha256;
use crate::crypto::keypair::PUBLIC_KEY_LEN;
use crate::encoding::{b58_encode, b64_decode_fixed};
use crate::error::{Result, WalletError};

pub const ADDRESS_PREFIX: &str = "oct";
pub const MIN_ADDRESS_LEN: usize = 46;
pub const MAX_ADDRESS_LEN: usize = 49;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub fn address_from_public_key(public_key: &[u8]) -> Result<String> {
    if public_key.len() != PUBLIC_KEY_LEN {
        return Err(WalletError::BadKeyLength {
            expected: PUBLIC_KEY_LEN,
            actual: public_key.len(),
        });
    }
    Ok(format!("{}{}", ADDRESS_PREFIX, b58_encode(&sha256(public_key))))
}

pub fn derive_address(public_key_b64: &str) -> Result<String> {
    let public_key = b64_decode_fixed::<PUBLIC_KEY_LEN>(public_key_b64)?;
    address_from_public_key(&public_key)
}

/// Format check only: prefix, length window and a pure base58 tail.
///
/// A 32-byte digest encodes to 43 or 44 base58 characters, so derived
/// addresses are 46 or 47 long. The window accepts 46 to 49.
pub fn verify_address_format(address: &str) -> bool {
    let Some(tail) = address.strip_prefix(ADDRESS_PREFIX) else {
        return false;
    };
    (MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&address.len())
        && tail.chars().all(|c| BASE58_ALPHABET.contains(c))
}

pub fn ensure_address(address: &str) -> Result<()> {
    if verify_address_format(address) {
        Ok(())
    } else {
        Err(WalletError::BadInputFormat(format!("invalid address: {}", address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_known_addresses() {
        let kp = KeyPair::from_seed(&[2u8; 32]);
        assert_eq!(
            derive_address(&kp.public_key_b64()).unwrap(),
            "oct89dkqqjMw9HTi1pqHbANSNwioHuMhmpTCXapTmfUr1EW"
        );
        let kp = KeyPair::from_seed(&[1u8; 32]);
        assert_eq!(
            address_from_public_key(&kp.public_key()).unwrap(),
            "oct4XmjKEd9A96KhoMX94zWJmd28dcPisbWGYWtad1dQ9v5"
        );
    }

    #[test]
    fn test_derived_addresses_always_validate() {
        for _ in 0..200 {
            let kp = KeyPair::generate();
            let addr = address_from_public_key(&kp.public_key()).unwrap();
            assert!(verify_address_format(&addr), "rejected {}", addr);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(!verify_address_format(""));
        assert!(!verify_address_format("oct"));
        // wrong prefix
        assert!(!verify_address_format("abc89dkqqjMw9HTi1pqHbANSNwioHuMhmpTCXapTmfUr1EW"));
        // '0' is not base58
        assert!(!verify_address_format("oct09dkqqjMw9HTi1pqHbANSNwioHuMhmpTCXapTmfUr1EW"));
        // too long
        assert!(!verify_address_format(&format!("oct{}", "1".repeat(47))));
        assert!(ensure_address("octXYZ").is_err());
    }

    #[test]
    fn test_length_window_edges() {
        // 43-char tail: what a digest below 58^43 encodes to
        assert!(verify_address_format(&format!("oct{}", "2".repeat(43))));
        assert!(verify_address_format(&format!("oct{}", "z".repeat(46))));
        assert!(!verify_address_format(&format!("oct{}", "2".repeat(42))));
    }

    #[test]
    fn test_bad_public_key_length() {
        assert!(matches!(
            address_from_public_key(&[0u8; 31]),
            Err(WalletError::BadKeyLength { expected: 32, actual: 31 })
        ));
    }
}
