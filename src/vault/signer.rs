// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key material import and the session signing capability.
//!
//! Wallets are created from a raw hex private key or a BIP-39 mnemonic.
//! The address is derived exactly once at import and persisted
//! lowercase-normalized; it is never recomputed from storage.

use alloy::{
    dyn_abi::TypedData,
    signers::{
        local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
        SignerSync,
    },
};
use zeroize::Zeroizing;

use crate::error::{WalletError, WalletResult};

/// Parsed key material ready for vault storage.
pub struct ImportedKey {
    /// Signer built from the material.
    pub signer: PrivateKeySigner,
    /// Lowercase 0x-prefixed address derived from the key.
    pub address: String,
    /// Raw 32-byte private key.
    pub private_key: Zeroizing<Vec<u8>>,
    /// The mnemonic phrase, when the material was one.
    pub mnemonic: Option<Zeroizing<String>>,
}

fn looks_like_hex_key(material: &str) -> bool {
    let stripped = material.strip_prefix("0x").unwrap_or(material);
    stripped.len() == 64 && stripped.chars().all(|c| c.is_ascii_hexdigit())
}

/// Import a hex private key or BIP-39 mnemonic.
pub fn import_material(material: &str) -> WalletResult<ImportedKey> {
    let material = material.trim();
    if material.is_empty() {
        return Err(WalletError::InvalidInput("empty key material".into()));
    }

    if looks_like_hex_key(material) {
        let signer: PrivateKeySigner = material
            .parse()
            .map_err(|_| WalletError::InvalidInput("malformed private key".into()))?;
        Ok(finish_import(signer, None))
    } else {
        let word_count = material.split_whitespace().count();
        if !matches!(word_count, 12 | 15 | 18 | 21 | 24) {
            return Err(WalletError::InvalidInput(format!(
                "mnemonic must be 12-24 words, got {word_count}"
            )));
        }

        let phrase = material.split_whitespace().collect::<Vec<_>>().join(" ");
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.as_str())
            .build()
            .map_err(|_| WalletError::InvalidInput("malformed mnemonic".into()))?;
        Ok(finish_import(signer, Some(Zeroizing::new(phrase))))
    }
}

fn finish_import(signer: PrivateKeySigner, mnemonic: Option<Zeroizing<String>>) -> ImportedKey {
    let address = format!("{:#x}", signer.address());
    let private_key = Zeroizing::new(signer.to_bytes().to_vec());
    ImportedKey {
        signer,
        address,
        private_key,
        mnemonic,
    }
}

/// Rebuild a signer from decrypted raw key bytes.
pub fn signer_from_bytes(bytes: &[u8]) -> WalletResult<PrivateKeySigner> {
    PrivateKeySigner::from_slice(bytes).map_err(|_| WalletError::AuthenticationFailed)
}

/// Sign a personal message (EIP-191 prefix applied by the signer).
pub fn sign_personal(signer: &PrivateKeySigner, message: &[u8]) -> WalletResult<String> {
    let signature = signer
        .sign_message_sync(message)
        .map_err(|e| WalletError::InvalidInput(format!("signing failed: {e}")))?;
    Ok(format!("0x{}", alloy::hex::encode(signature.as_bytes())))
}

/// Sign an EIP-712 typed-data payload.
pub fn sign_typed_data(
    signer: &PrivateKeySigner,
    payload: &serde_json::Value,
) -> WalletResult<String> {
    let typed: TypedData = serde_json::from_value(payload.clone())
        .map_err(|e| WalletError::InvalidInput(format!("malformed typed data: {e}")))?;
    let hash = typed
        .eip712_signing_hash()
        .map_err(|e| WalletError::InvalidInput(format!("typed data hashing failed: {e}")))?;
    let signature = signer
        .sign_hash_sync(&hash)
        .map_err(|e| WalletError::InvalidInput(format!("signing failed: {e}")))?;
    Ok(format!("0x{}", alloy::hex::encode(signature.as_bytes())))
}
