// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Handoff Store
//!
//! Short-lived tokens that bootstrap identity for execution contexts with no
//! established wallet session (first connect from a redirected page or a
//! server-relayed flow). Records expire after a fixed 24-hour TTL and are a
//! collaborator-side convenience only; they are never consulted for
//! approval decisions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};

/// Fixed TTL for handoff records.
const HANDOFF_TTL_HOURS: i64 = 24;

/// A pending identity handoff.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HandoffRecord {
    /// Opaque single-use token.
    pub token: String,
    /// The user the handoff belongs to.
    pub user_id: String,
    /// Where to send the context once identity is established.
    pub return_url: String,
    /// Expiry timestamp (created_at + 24 h).
    pub expires_at: DateTime<Utc>,
}

/// In-memory store of handoff records, keyed by token, plus the identity
/// directory backing the register/status collaborator endpoints.
#[derive(Default)]
pub struct HandoffStore {
    inner: Mutex<HashMap<String, HandoffRecord>>,
    /// user id → registered wallet address.
    users: Mutex<HashMap<String, String>>,
}

impl HandoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, HashMap<String, HandoffRecord>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a user's wallet address.
    pub fn register_user(&self, user_id: &str, address: &str) {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), address.to_lowercase());
    }

    /// Look up a registered user's address.
    pub fn user_address(&self, user_id: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    /// Issue a new handoff token for a user. Stale records are pruned on
    /// the way.
    pub fn issue(&self, user_id: &str, return_url: &str) -> HandoffRecord {
        self.purge_expired();
        let record = HandoffRecord {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            return_url: return_url.to_string(),
            expires_at: Utc::now() + Duration::hours(HANDOFF_TTL_HOURS),
        };
        self.lock_inner()
            .insert(record.token.clone(), record.clone());
        record
    }

    /// Look up a token, applying lazy expiry.
    pub fn get(&self, token: &str) -> WalletResult<HandoffRecord> {
        let mut inner = self.lock_inner();
        match inner.get(token) {
            Some(record) if record.expires_at > Utc::now() => Ok(record.clone()),
            Some(_) => {
                inner.remove(token);
                Err(WalletError::NotFound(format!("handoff token {token}")))
            }
            None => Err(WalletError::NotFound(format!("handoff token {token}"))),
        }
    }

    /// Consume a token (single use).
    pub fn redeem(&self, token: &str) -> WalletResult<HandoffRecord> {
        let record = self.get(token)?;
        self.lock_inner().remove(token);
        Ok(record)
    }

    /// Drop all expired records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.lock_inner();
        let now = Utc::now();
        let before = inner.len();
        inner.retain(|_, record| record.expires_at > now);
        before - inner.len()
    }
}
