// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password-gated sealing for wallet secrets.
//!
//! Blob format: Argon2id derives a 32-byte key from the NFKD-normalized
//! password and a random 16-byte salt; ChaCha20-Poly1305 seals the secret
//! under a random 12-byte nonce. Salt, nonce, and ciphertext are stored
//! base64-encoded inside the wallet's JSON record.
//!
//! Decryption failure is reported as `AuthenticationFailed` without
//! distinguishing a wrong password from corrupt data.

use argon2::Argon2;
use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{WalletError, WalletResult};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// A sealed secret as persisted inside a wallet record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedBlob {
    /// Key-derivation function identifier. Always `argon2id` today.
    pub kdf: String,
    /// Base64-encoded KDF salt.
    pub salt: String,
    /// Base64-encoded AEAD nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext (includes the Poly1305 tag).
    pub ciphertext: String,
}

/// Normalize a password for key derivation.
///
/// NFKD, so visually identical inputs from different keyboards derive the
/// same key (the same normalization BIP-39 applies to passphrases).
pub fn normalize_password(password: &str) -> Zeroizing<String> {
    Zeroizing::new(password.nfkd().collect::<String>())
}

fn derive_key(password: &str, salt: &[u8]) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
    let normalized = normalize_password(password);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::default()
        .hash_password_into(normalized.as_bytes(), salt, &mut key[..])
        .map_err(|e| WalletError::InvalidInput(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Seal a secret under a password.
pub fn seal(secret: &[u8], password: &str) -> WalletResult<SealedBlob> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let mut key = derive_key(password, &salt)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|_| WalletError::InvalidInput("encryption failed".into()))?;
    key.zeroize();

    Ok(SealedBlob {
        kdf: "argon2id".to_string(),
        salt: Base64::encode_string(&salt),
        nonce: Base64::encode_string(&nonce_bytes),
        ciphertext: Base64::encode_string(&ciphertext),
    })
}

/// Open a sealed secret with a password.
///
/// Returns `AuthenticationFailed` for any failure past blob parsing: a wrong
/// password and a tampered ciphertext are indistinguishable to the caller.
pub fn open(blob: &SealedBlob, password: &str) -> WalletResult<Zeroizing<Vec<u8>>> {
    let salt = Base64::decode_vec(&blob.salt)
        .map_err(|_| WalletError::AuthenticationFailed)?;
    let nonce = Base64::decode_vec(&blob.nonce)
        .map_err(|_| WalletError::AuthenticationFailed)?;
    let ciphertext = Base64::decode_vec(&blob.ciphertext)
        .map_err(|_| WalletError::AuthenticationFailed)?;

    if nonce.len() != NONCE_LEN {
        return Err(WalletError::AuthenticationFailed);
    }

    let mut key = derive_key(password, &salt).map_err(|_| WalletError::AuthenticationFailed)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| WalletError::AuthenticationFailed)?;
    key.zeroize();

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open_round_trip() {
        let secret = b"super secret key bytes";
        let blob = seal(secret, "correct horse").unwrap();

        assert_eq!(blob.kdf, "argon2id");
        let opened = open(&blob, "correct horse").unwrap();
        assert_eq!(opened.as_slice(), secret);
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let blob = seal(b"secret", "password-a").unwrap();
        let err = open(&blob, "password-b").unwrap_err();
        assert!(matches!(err, WalletError::AuthenticationFailed));
    }

    #[test]
    fn tampered_ciphertext_looks_like_wrong_password() {
        let mut blob = seal(b"secret", "password").unwrap();
        blob.ciphertext = Base64::encode_string(b"garbage bytes here padded long");

        let err = open(&blob, "password").unwrap_err();
        assert!(matches!(err, WalletError::AuthenticationFailed));
    }

    #[test]
    fn nfkd_equivalent_passwords_derive_same_key() {
        // U+212B ANGSTROM SIGN normalizes to A + combining ring (U+0041 U+030A)
        let composed = "\u{212B}ngstr\u{00F6}m";
        let decomposed = "\u{0041}\u{030A}ngstr\u{006F}\u{0308}m";

        let blob = seal(b"secret", composed).unwrap();
        let opened = open(&blob, decomposed).unwrap();
        assert_eq!(opened.as_slice(), b"secret");
    }

    #[test]
    fn each_seal_uses_fresh_salt_and_nonce() {
        let a = seal(b"secret", "pw").unwrap();
        let b = seal(b"secret", "pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
