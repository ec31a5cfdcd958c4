// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Vault
//!
//! Encrypted-at-rest wallet records plus the lock state machine that gates
//! the approval pipeline.
//!
//! ## Storage Layout
//!
//! Each wallet is one JSON record under `<data>/wallets/`; private keys and
//! mnemonics inside it are sealed by [`cipher`]. Vault-wide settings (active
//! wallet, auto-lock) live in `<data>/vault.json`.
//!
//! ## Lock model
//!
//! `unlock` verifies the password against the active wallet and materializes
//! session signers for every wallet it can decrypt. The signers exist only in
//! process memory and are dropped on `lock()`. A fresh process (or the
//! designated entry-point reload) always starts locked.

pub mod autolock;
pub mod cipher;
pub mod signer;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use alloy::signers::local::PrivateKeySigner;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};
use crate::storage::JsonStore;
use cipher::SealedBlob;

/// Default idle interval before the vault locks itself (seconds).
pub const DEFAULT_AUTO_LOCK_SECONDS: u64 = 300;

/// A wallet record as persisted on disk. Secrets are sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Unique wallet identifier (UUID).
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Lowercase 0x-prefixed address, derived once at creation.
    pub address: String,
    /// Private key sealed under the vault password.
    pub encrypted_private_key: SealedBlob,
    /// Mnemonic sealed under the vault password, when the wallet was
    /// created from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_mnemonic: Option<SealedBlob>,
    /// When the wallet was created.
    pub created_at: DateTime<Utc>,
    /// The first-created wallet; never deletable.
    pub primary: bool,
}

/// Public view of a wallet (never includes sealed material).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletSummary {
    /// Unique wallet identifier.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Lowercase 0x-prefixed address.
    pub address: String,
    /// When the wallet was created.
    pub created_at: DateTime<Utc>,
    /// Whether this is the non-deletable primary wallet.
    pub primary: bool,
}

impl From<&WalletRecord> for WalletSummary {
    fn from(record: &WalletRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            address: record.address.clone(),
            created_at: record.created_at,
            primary: record.primary,
        }
    }
}

/// Current vault state for the UI.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VaultStatus {
    /// Whether signing capability is currently unavailable.
    pub is_locked: bool,
    /// Number of wallets in the vault.
    pub wallet_count: usize,
    /// Wallet that services requests by default.
    pub active_wallet_id: Option<String>,
    /// Idle seconds before auto-lock; 0 disables.
    pub auto_lock_seconds: u64,
}

/// Vault-wide settings persisted at `<data>/vault.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultMeta {
    active_wallet_id: Option<String>,
    auto_lock_seconds: u64,
}

impl Default for VaultMeta {
    fn default() -> Self {
        Self {
            active_wallet_id: None,
            auto_lock_seconds: DEFAULT_AUTO_LOCK_SECONDS,
        }
    }
}

struct VaultInner {
    wallets: HashMap<String, WalletRecord>,
    meta: VaultMeta,
    is_locked: bool,
    last_activity: Instant,
    /// Session-scoped signing capability; never persisted.
    session: HashMap<String, PrivateKeySigner>,
}

/// The key vault: wallet records, password gate, lock state machine.
pub struct KeyVault {
    store: JsonStore,
    inner: Mutex<VaultInner>,
}

impl KeyVault {
    /// Open the vault, loading all wallet records. Starts locked.
    pub fn open(store: JsonStore) -> WalletResult<Self> {
        let meta: VaultMeta = if store.exists(store.paths().vault_meta()) {
            store.read_json(store.paths().vault_meta())?
        } else {
            VaultMeta::default()
        };

        let mut wallets = HashMap::new();
        for id in store.list_ids(store.paths().wallets_dir())? {
            match store.read_json::<WalletRecord>(store.paths().wallet(&id)) {
                Ok(record) => {
                    wallets.insert(record.id.clone(), record);
                }
                Err(e) => warn!(wallet_id = %id, error = %e, "Skipping unreadable wallet record"),
            }
        }

        info!(wallet_count = wallets.len(), "Vault opened (locked)");

        Ok(Self {
            store,
            inner: Mutex::new(VaultInner {
                wallets,
                meta,
                is_locked: true,
                last_activity: Instant::now(),
                session: HashMap::new(),
            }),
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, VaultInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The record that gates password verification: the active wallet, the
    /// primary as fallback.
    fn gate_record(inner: &VaultInner) -> Option<&WalletRecord> {
        inner
            .meta
            .active_wallet_id
            .as_deref()
            .and_then(|id| inner.wallets.get(id))
            .or_else(|| inner.wallets.values().find(|w| w.primary))
    }

    // ========== Wallet lifecycle ==========

    /// Create a wallet from a hex private key or BIP-39 mnemonic.
    ///
    /// The first wallet becomes the non-deletable primary, sets the vault
    /// password, and leaves the vault unlocked for the new session. Later
    /// wallets must be sealed under the existing vault password, which is
    /// re-verified here.
    pub fn create(&self, material: &str, password: &str, name: &str) -> WalletResult<WalletSummary> {
        let imported = signer::import_material(material)?;

        let mut inner = self.lock_inner();

        if !inner.wallets.is_empty() {
            let gate = Self::gate_record(&inner)
                .ok_or_else(|| WalletError::NotFound("active wallet".into()))?;
            cipher::open(&gate.encrypted_private_key, password)?;
        }

        if inner.wallets.values().any(|w| w.address == imported.address) {
            return Err(WalletError::InvariantViolation(format!(
                "a wallet for address {} already exists",
                imported.address
            )));
        }

        let record = WalletRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            address: imported.address.clone(),
            encrypted_private_key: cipher::seal(&imported.private_key, password)?,
            encrypted_mnemonic: imported
                .mnemonic
                .as_ref()
                .map(|m| cipher::seal(m.as_bytes(), password))
                .transpose()?,
            created_at: Utc::now(),
            primary: inner.wallets.is_empty(),
        };

        self.store
            .write_json(self.store.paths().wallet(&record.id), &record)?;

        let summary = WalletSummary::from(&record);
        let first = record.primary;

        if first {
            inner.meta.active_wallet_id = Some(record.id.clone());
            self.store
                .write_json(self.store.paths().vault_meta(), &inner.meta)?;
            // Vault initialization: the creator just proved knowledge of the
            // password, so the session starts unlocked.
            inner.is_locked = false;
        }
        if !inner.is_locked {
            inner.session.insert(record.id.clone(), imported.signer);
        }
        inner.wallets.insert(record.id.clone(), record);
        inner.last_activity = Instant::now();

        info!(wallet_id = %summary.id, address = %summary.address, primary = first, "Wallet created");
        Ok(summary)
    }

    /// Delete a wallet. The primary and the last remaining wallet are
    /// protected.
    pub fn delete(&self, wallet_id: &str) -> WalletResult<()> {
        let mut inner = self.lock_inner();

        let record = inner
            .wallets
            .get(wallet_id)
            .ok_or_else(|| WalletError::NotFound(format!("wallet {wallet_id}")))?;

        if record.primary {
            return Err(WalletError::InvariantViolation(
                "the primary wallet cannot be deleted".into(),
            ));
        }
        if inner.wallets.len() == 1 {
            return Err(WalletError::InvariantViolation(
                "the last remaining wallet cannot be deleted".into(),
            ));
        }

        self.store.delete(self.store.paths().wallet(wallet_id))?;
        inner.wallets.remove(wallet_id);
        inner.session.remove(wallet_id);

        if inner.meta.active_wallet_id.as_deref() == Some(wallet_id) {
            inner.meta.active_wallet_id =
                inner.wallets.values().find(|w| w.primary).map(|w| w.id.clone());
            self.store
                .write_json(self.store.paths().vault_meta(), &inner.meta)?;
        }

        info!(wallet_id = %wallet_id, "Wallet deleted");
        Ok(())
    }

    /// List wallet summaries.
    pub fn wallets(&self) -> Vec<WalletSummary> {
        let inner = self.lock_inner();
        let mut list: Vec<WalletSummary> =
            inner.wallets.values().map(WalletSummary::from).collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Make a wallet the active one.
    pub fn set_active(&self, wallet_id: &str) -> WalletResult<()> {
        let mut inner = self.lock_inner();
        if !inner.wallets.contains_key(wallet_id) {
            return Err(WalletError::NotFound(format!("wallet {wallet_id}")));
        }
        inner.meta.active_wallet_id = Some(wallet_id.to_string());
        self.store
            .write_json(self.store.paths().vault_meta(), &inner.meta)?;
        inner.last_activity = Instant::now();
        Ok(())
    }

    // ========== Lock state machine ==========

    /// Unlock the vault with the password.
    ///
    /// On success all decryptable wallet signers join the session. On failure
    /// the vault state is unchanged and the caller cannot tell a wrong
    /// password from corrupt key material.
    pub fn unlock(&self, password: &str) -> WalletResult<()> {
        let mut inner = self.lock_inner();

        let gate = Self::gate_record(&inner)
            .ok_or_else(|| WalletError::NotFound("no wallets in vault".into()))?;
        cipher::open(&gate.encrypted_private_key, password)?;

        let mut session = HashMap::new();
        for record in inner.wallets.values() {
            match cipher::open(&record.encrypted_private_key, password)
                .and_then(|bytes| signer::signer_from_bytes(&bytes))
            {
                Ok(s) => {
                    session.insert(record.id.clone(), s);
                }
                Err(_) => {
                    warn!(wallet_id = %record.id, "Wallet did not decrypt under the vault password")
                }
            }
        }

        inner.session = session;
        inner.is_locked = false;
        inner.last_activity = Instant::now();
        info!("Vault unlocked");
        Ok(())
    }

    /// Lock the vault, dropping the session signing capability. Idempotent.
    pub fn lock(&self) {
        let mut inner = self.lock_inner();
        if !inner.is_locked {
            info!("Vault locked");
        }
        inner.session.clear();
        inner.is_locked = true;
    }

    /// Unconditional lock on designated entry-point reload: a fresh load of
    /// the authenticated view is untrusted until re-authenticated.
    pub fn lock_on_entry(&self) {
        debug!("Entry-point reload, forcing lock");
        self.lock();
    }

    /// Whether the vault is locked.
    pub fn is_locked(&self) -> bool {
        self.lock_inner().is_locked
    }

    /// Record user activity for the idle timer.
    pub fn touch(&self) {
        self.lock_inner().last_activity = Instant::now();
    }

    /// Idle time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        self.lock_inner().last_activity.elapsed()
    }

    /// Configure the auto-lock threshold (0 disables).
    pub fn set_auto_lock_seconds(&self, seconds: u64) -> WalletResult<()> {
        let mut inner = self.lock_inner();
        inner.meta.auto_lock_seconds = seconds;
        self.store
            .write_json(self.store.paths().vault_meta(), &inner.meta)?;
        Ok(())
    }

    /// Lock if the idle threshold has been reached. Returns true when a lock
    /// happened.
    pub fn maybe_autolock(&self) -> bool {
        let mut inner = self.lock_inner();
        let threshold = inner.meta.auto_lock_seconds;
        if inner.is_locked || threshold == 0 {
            return false;
        }
        if inner.last_activity.elapsed() >= Duration::from_secs(threshold) {
            inner.session.clear();
            inner.is_locked = true;
            info!(idle_secs = threshold, "Vault auto-locked");
            return true;
        }
        false
    }

    /// Current vault status.
    pub fn status(&self) -> VaultStatus {
        let inner = self.lock_inner();
        VaultStatus {
            is_locked: inner.is_locked,
            wallet_count: inner.wallets.len(),
            active_wallet_id: inner.meta.active_wallet_id.clone(),
            auto_lock_seconds: inner.meta.auto_lock_seconds,
        }
    }

    // ========== Password rotation ==========

    /// Re-encrypt every wallet's secrets under a new password.
    ///
    /// `current` is verified against the active wallet first; if verification
    /// or any decryption fails, no record is mutated.
    pub fn change_password(&self, current: &str, new: &str) -> WalletResult<()> {
        let mut inner = self.lock_inner();

        let gate = Self::gate_record(&inner)
            .ok_or_else(|| WalletError::NotFound("no wallets in vault".into()))?;
        cipher::open(&gate.encrypted_private_key, current)?;

        // Decrypt everything before writing anything
        let mut reencrypted: Vec<WalletRecord> = Vec::with_capacity(inner.wallets.len());
        for record in inner.wallets.values() {
            let key_bytes = cipher::open(&record.encrypted_private_key, current)?;
            let mnemonic_bytes = record
                .encrypted_mnemonic
                .as_ref()
                .map(|blob| cipher::open(blob, current))
                .transpose()?;

            let mut updated = record.clone();
            updated.encrypted_private_key = cipher::seal(&key_bytes, new)?;
            updated.encrypted_mnemonic = mnemonic_bytes
                .map(|bytes| cipher::seal(&bytes, new))
                .transpose()?;
            reencrypted.push(updated);
        }

        for record in reencrypted {
            self.store
                .write_json(self.store.paths().wallet(&record.id), &record)?;
            inner.wallets.insert(record.id.clone(), record);
        }

        inner.last_activity = Instant::now();
        info!("Vault password changed");
        Ok(())
    }

    // ========== Signing capability ==========

    fn resolve_wallet_id(inner: &VaultInner, wallet_id: Option<&str>) -> WalletResult<String> {
        match wallet_id {
            Some(id) => {
                if inner.wallets.contains_key(id) {
                    Ok(id.to_string())
                } else {
                    Err(WalletError::NotFound(format!("wallet {id}")))
                }
            }
            None => inner
                .meta
                .active_wallet_id
                .clone()
                .ok_or_else(|| WalletError::NotFound("no active wallet".into())),
        }
    }

    /// Address of the given (or active) wallet. Available while locked;
    /// addresses are public.
    pub fn address_of(&self, wallet_id: Option<&str>) -> WalletResult<String> {
        let inner = self.lock_inner();
        let id = Self::resolve_wallet_id(&inner, wallet_id)?;
        Ok(inner.wallets[&id].address.clone())
    }

    /// Accounts disclosed to connected origins: the active wallet's address.
    pub fn disclosed_accounts(&self) -> WalletResult<Vec<String>> {
        Ok(vec![self.address_of(None)?])
    }

    fn with_signer<T>(
        &self,
        wallet_id: Option<&str>,
        f: impl FnOnce(&PrivateKeySigner) -> WalletResult<T>,
    ) -> WalletResult<T> {
        let mut inner = self.lock_inner();
        if inner.is_locked {
            return Err(WalletError::VaultLocked);
        }
        let id = Self::resolve_wallet_id(&inner, wallet_id)?;
        inner.last_activity = Instant::now();
        let signer = inner.session.get(&id).ok_or(WalletError::VaultLocked)?;
        f(signer)
    }

    /// Sign a personal message (EIP-191) with the given or active wallet.
    pub fn sign_personal(&self, wallet_id: Option<&str>, message: &[u8]) -> WalletResult<String> {
        self.with_signer(wallet_id, |s| signer::sign_personal(s, message))
    }

    /// Sign an EIP-712 typed-data payload with the given or active wallet.
    pub fn sign_typed_data(
        &self,
        wallet_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> WalletResult<String> {
        self.with_signer(wallet_id, |s| signer::sign_typed_data(s, payload))
    }
}
