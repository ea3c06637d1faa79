use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, Zeroizing};

use crate::encoding::{b64_decode, b64_decode_fixed, b64_encode};
use crate::error::{Result, WalletError};

pub const PRIVATE_KEY_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// 32-byte Ed25519 seed. Overwritten with random bytes, then zeroed, on drop.
pub struct PrivateKey([u8; PRIVATE_KEY_LEN]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_LEN]) -> Self {
        PrivateKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(WalletError::BadKeyLength {
                expected: PRIVATE_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; PRIVATE_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(PrivateKey(key))
    }

    pub fn from_b64(s: &str) -> Result<Self> {
        let bytes = Zeroizing::new(b64_decode(s)?);
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }

    pub fn to_b64(&self) -> Zeroizing<String> {
        Zeroizing::new(b64_encode(&self.0))
    }

    pub fn wipe(&mut self) {
        OsRng.fill_bytes(&mut self.0);
        self.0.zeroize();
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        PrivateKey(self.0)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        crate::encoding::constant_time_eq(&self.0, &other.0)
    }
}

/// Serialized as standard base64.
impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_b64())
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        PrivateKey::from_b64(&encoded).map_err(de::Error::custom)
    }
}

pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Standard Ed25519 expansion of a 32-byte seed.
    pub fn from_seed(seed: &[u8; PRIVATE_KEY_LEN]) -> Self {
        KeyPair {
            signing: SigningKey::from_bytes(seed),
        }
    }

    pub fn from_private_key(key: &PrivateKey) -> Self {
        Self::from_seed(key.as_bytes())
    }

    pub fn generate() -> Self {
        let mut csprng = OsRng;
        KeyPair {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_bytes(self.signing.to_bytes())
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn public_key_b64(&self) -> String {
        b64_encode(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }

    pub fn sign_b64(&self, message: &[u8]) -> String {
        b64_encode(&self.sign(message))
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_with_pubkey(message, signature, &self.public_key())
    }
}

/// Verify a detached signature against raw public key bytes.
pub fn verify_with_pubkey(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    match VerifyingKey::from_bytes(&pk_bytes) {
        Ok(pubkey) => pubkey.verify(message, &signature).is_ok(),
        Err(_) => false,
    }
}

/// Same as [`verify_with_pubkey`] with base64 signature and key.
pub fn verify_with_pubkey_b64(message: &[u8], signature_b64: &str, pubkey_b64: &str) -> bool {
    match (
        b64_decode_fixed::<SIGNATURE_LEN>(signature_b64),
        b64_decode_fixed::<PUBLIC_KEY_LEN>(pubkey_b64),
    ) {
        (Ok(sig), Ok(pk)) => verify_with_pubkey(message, &sig, &pk),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc8032_public_key() {
        let seed: [u8; 32] = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
            .unwrap()
            .try_into()
            .unwrap();
        let kp = KeyPair::from_seed(&seed);
        assert_eq!(
            hex::encode(kp.public_key()),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );
    }

    #[test]
    fn test_sign_verify_and_bit_flip() {
        let kp = KeyPair::generate();
        let msg = b"octra transfer";
        let mut sig = kp.sign(msg);
        assert!(kp.verify(msg, &sig));
        assert!(!kp.verify(b"octra transfer!", &sig));
        sig[10] ^= 0x01;
        assert!(!kp.verify(msg, &sig));
    }

    #[test]
    fn test_public_key_bit_flip_rejected() {
        let kp = KeyPair::from_seed(&[4u8; 32]);
        let msg = b"octra transfer";
        let sig = kp.sign(msg);
        assert!(verify_with_pubkey(msg, &sig, &kp.public_key()));
        for bit in 0..256 {
            let mut pk = kp.public_key();
            pk[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify_with_pubkey(msg, &sig, &pk), "bit {}", bit);
        }
    }

    #[test]
    fn test_b64_verify_rejects_garbage() {
        let kp = KeyPair::from_seed(&[3u8; 32]);
        let sig = kp.sign_b64(b"m");
        assert!(verify_with_pubkey_b64(b"m", &sig, &kp.public_key_b64()));
        assert!(!verify_with_pubkey_b64(b"m", "not base64!", &kp.public_key_b64()));
        assert!(!verify_with_pubkey_b64(b"m", &sig, "AAAA"));
    }

    #[test]
    fn test_private_key_roundtrip_and_wipe() {
        let kp = KeyPair::from_seed(&[9u8; 32]);
        let mut key = kp.private_key();
        assert_eq!(key.as_bytes(), &[9u8; 32]);
        let restored = PrivateKey::from_b64(&key.to_b64()).unwrap();
        assert!(restored == key);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_b64().as_str()));
        let parsed: PrivateKey = serde_json::from_str(&json).unwrap();
        assert!(parsed == key);
        key.wipe();
        assert_eq!(key.as_bytes(), &[0u8; 32]);
        assert!(PrivateKey::from_slice(&[1u8; 31]).is_err());
    }
}
