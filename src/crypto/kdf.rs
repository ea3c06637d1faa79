//! PBKDF2 that can be abandoned between iterations.
//!
//! Vault unlock runs 100k HMAC-SHA-256 rounds and seed derivation 2048
//! HMAC-SHA-512 rounds. Both run on a blocking thread and poll a
//! [`CancellationToken`] once per iteration; on cancel every intermediate
//! buffer and the partially written output are wiped.

use hmac::digest::{KeyInit, OutputSizeUser};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroize;

use crate::error::{Result, WalletError};

/// PBKDF2 (RFC 8018) over any HMAC-like PRF.
pub fn pbkdf2_hmac<M>(
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    out: &mut [u8],
    cancel: &CancellationToken,
) -> Result<()>
where
    M: Mac + KeyInit + Clone,
{
    if rounds == 0 {
        return Err(WalletError::BadInputFormat("pbkdf2 rounds must be > 0".to_string()));
    }
    let prf = <M as KeyInit>::new_from_slice(password)
        .map_err(|_| WalletError::BadInputFormat("pbkdf2 password".to_string()))?;
    let h_len = <M as OutputSizeUser>::output_size();

    for (i, chunk) in out.chunks_mut(h_len).enumerate() {
        let block_index = (i as u32 + 1).to_be_bytes();

        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&block_index);
        let mut u = mac.finalize().into_bytes();
        let mut t = u.clone();

        for _ in 1..rounds {
            if cancel.is_cancelled() {
                u.as_mut_slice().zeroize();
                t.as_mut_slice().zeroize();
                out.zeroize();
                return Err(WalletError::Cancelled);
            }
            let mut mac = prf.clone();
            mac.update(&u);
            let next = mac.finalize().into_bytes();
            u.as_mut_slice().zeroize();
            u = next;
            for (acc, b) in t.iter_mut().zip(u.iter()) {
                *acc ^= b;
            }
        }

        chunk.copy_from_slice(&t[..chunk.len()]);
        u.as_mut_slice().zeroize();
        t.as_mut_slice().zeroize();
    }
    Ok(())
}

pub fn pbkdf2_sha256(
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    out: &mut [u8],
    cancel: &CancellationToken,
) -> Result<()> {
    pbkdf2_hmac::<Hmac<Sha256>>(password, salt, rounds, out, cancel)
}

pub fn pbkdf2_sha512(
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    out: &mut [u8],
    cancel: &CancellationToken,
) -> Result<()> {
    pbkdf2_hmac::<Hmac<Sha512>>(password, salt, rounds, out, cancel)
}

/// Run `job` on the blocking pool with a token that is cancelled when the
/// returned future is dropped, e.g. by `tokio::time::timeout`.
pub async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    let result = tokio::task::spawn_blocking(move || job(&token))
        .await
        .map_err(|_| WalletError::Cancelled)?;
    guard.disarm();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_vectors() {
        let token = CancellationToken::new();
        let mut out = [0u8; 32];
        pbkdf2_sha256(b"password", b"salt", 1, &mut out, &token).unwrap();
        assert_eq!(
            hex::encode(out),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
        pbkdf2_sha256(b"password", b"salt", 2, &mut out, &token).unwrap();
        assert_eq!(
            hex::encode(out),
            "ae4d0c95af6b46d32d0adff928f06dd02a303f8ef3c251dfd6e2d85a95474c43"
        );
    }

    #[test]
    fn test_sha512_vector() {
        let token = CancellationToken::new();
        let mut out = [0u8; 64];
        pbkdf2_sha512(b"password", b"salt", 1, &mut out, &token).unwrap();
        assert_eq!(
            hex::encode(out),
            "867f70cf1ade02cff3752599a3a53dc4af34c7a669815ae5d513554e1c8cf252\
             c02d470a285a0501bad999bfe943c08f050235d7d68b1da55e63f73b60a57fce"
        );
    }

    #[test]
    fn test_matches_reference_crate() {
        let token = CancellationToken::new();
        // 40 bytes spans two SHA-256 blocks
        let mut ours = [0u8; 40];
        let mut reference = [0u8; 40];
        pbkdf2_sha256(b"pass phrase", b"NaCl salt", 77, &mut ours, &token).unwrap();
        pbkdf2::pbkdf2::<Hmac<Sha256>>(b"pass phrase", b"NaCl salt", 77, &mut reference);
        assert_eq!(ours, reference);

        let mut ours = [0u8; 64];
        let mut reference = [0u8; 64];
        pbkdf2_sha512(b"mnemonic words", b"mnemonicTREZOR", 2048, &mut ours, &token).unwrap();
        pbkdf2::pbkdf2::<Hmac<Sha512>>(b"mnemonic words", b"mnemonicTREZOR", 2048, &mut reference);
        assert_eq!(ours, reference);
    }

    #[test]
    fn test_cancel_wipes_output() {
        let token = CancellationToken::new();
        token.cancel();
        let mut out = [0xAAu8; 32];
        let err = pbkdf2_sha256(b"password", b"salt", 1000, &mut out, &token).unwrap_err();
        assert!(matches!(err, WalletError::Cancelled));
        assert_eq!(out, [0u8; 32]);
    }

    #[tokio::test]
    async fn test_dropped_future_cancels_worker() {
        let (tx, rx) = std::sync::mpsc::channel();
        let fut = run_blocking(move |token| {
            let mut out = [0u8; 32];
            let res = pbkdf2_sha256(b"password", b"salt", u32::MAX, &mut out, token);
            let _ = tx.send((res.is_err(), out));
            res
        });
        let timed = tokio::time::timeout(std::time::Duration::from_millis(20), fut).await;
        assert!(timed.is_err());
        let (cancelled, out) = tokio::task::spawn_blocking(move || rx.recv().unwrap())
            .await
            .unwrap();
        assert!(cancelled);
        assert_eq!(out, [0u8; 32]);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let token = CancellationToken::new();
        let mut out = [0u8; 32];
        assert!(pbkdf2_sha256(b"p", b"s", 0, &mut out, &token).is_err());
    }
}
