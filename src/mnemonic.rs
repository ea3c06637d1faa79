//! BIP39 mnemonics, fixed at 12 English words (128 bits of entropy).
//!
//! The phrase <-> entropy mapping is delegated to the `bip39` crate. Seed
//! stretching goes through the cancellable PBKDF2 in [`crate::crypto::kdf`]
//! so a slow host can abandon it.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::crypto::kdf;
use crate::error::{MnemonicError, Result};

pub const ENTROPY_LEN: usize = 16;
pub const WORD_COUNT: usize = 12;
pub const SEED_LEN: usize = 64;
pub const SEED_ITERATIONS: u32 = 2048;

pub fn word_list() -> &'static [&'static str; 2048] {
    Language::English.word_list()
}

pub fn entropy_to_mnemonic(entropy: &[u8]) -> std::result::Result<Zeroizing<String>, MnemonicError> {
    if entropy.len() != ENTROPY_LEN {
        return Err(MnemonicError::BadEntropyLength(entropy.len()));
    }
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|_| MnemonicError::BadEntropyLength(entropy.len()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Fresh 12-word phrase from the OS RNG.
pub fn generate_mnemonic() -> Result<Zeroizing<String>> {
    let mut entropy = Zeroizing::new([0u8; ENTROPY_LEN]);
    OsRng.fill_bytes(&mut entropy[..]);
    Ok(entropy_to_mnemonic(&entropy[..])?)
}

/// Lowercase, single-space separated form of a user supplied phrase.
pub fn normalize_phrase(phrase: &str) -> Zeroizing<String> {
    Zeroizing::new(
        phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn parse(phrase: &str) -> std::result::Result<Mnemonic, MnemonicError> {
    let normalized = normalize_phrase(phrase);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

    let list = word_list();
    let known = |w: &str| {
        list.binary_search_by(|candidate| candidate.as_bytes().cmp(w.as_bytes()))
            .is_ok()
    };
    if let Some(unknown) = words.iter().find(|w| !known(w)) {
        return Err(MnemonicError::UnknownWord(unknown.to_string()));
    }
    if words.len() != WORD_COUNT {
        return Err(MnemonicError::BadEntropyLength(words.len() * 4 / 3));
    }

    Mnemonic::parse_in_normalized(Language::English, &normalized).map_err(|e| match e {
        bip39::Error::InvalidChecksum => MnemonicError::BadChecksum,
        bip39::Error::UnknownWord(i) => {
            MnemonicError::UnknownWord(words.get(i).copied().unwrap_or_default().to_string())
        }
        _ => MnemonicError::BadEntropyLength(words.len() * 4 / 3),
    })
}

pub fn validate_mnemonic(phrase: &str) -> std::result::Result<(), MnemonicError> {
    parse(phrase).map(|_| ())
}

pub fn mnemonic_to_entropy(phrase: &str) -> std::result::Result<Zeroizing<Vec<u8>>, MnemonicError> {
    Ok(Zeroizing::new(parse(phrase)?.to_entropy()))
}

/// PBKDF2-HMAC-SHA-512(phrase, "mnemonic" + passphrase, 2048, 64).
///
/// The phrase bytes are used verbatim; callers normalize first.
pub fn mnemonic_to_seed_cancellable(
    phrase: &str,
    passphrase: &str,
    cancel: &CancellationToken,
) -> Result<Zeroizing<[u8; SEED_LEN]>> {
    let salt = Zeroizing::new(format!("mnemonic{}", passphrase));
    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    kdf::pbkdf2_sha512(
        phrase.as_bytes(),
        salt.as_bytes(),
        SEED_ITERATIONS,
        &mut seed[..],
        cancel,
    )?;
    Ok(seed)
}

pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<Zeroizing<[u8; SEED_LEN]>> {
    mnemonic_to_seed_cancellable(phrase, passphrase, &CancellationToken::new())
}

/// Seed derivation on the blocking pool; dropping the future cancels it.
pub async fn mnemonic_to_seed_async(
    phrase: Zeroizing<String>,
    passphrase: Zeroizing<String>,
) -> Result<Zeroizing<[u8; SEED_LEN]>> {
    kdf::run_blocking(move |cancel| mnemonic_to_seed_cancellable(&phrase, &passphrase, cancel)).await
}
