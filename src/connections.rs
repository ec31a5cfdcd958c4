// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Connected-Origin Directory
//!
//! Authorization cache of dApp origins the user has already approved via a
//! connect-class decision. Presence permits silent read-only account
//! disclosure (`eth_accounts`-class); it never bypasses the approval
//! pipeline for signing-class methods.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};
use crate::storage::JsonStore;

/// A dApp origin the user has approved for read-only disclosure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectedDApp {
    /// Unique identifier for this connection.
    pub id: String,
    /// The dApp's origin (scheme + host + port).
    pub origin: String,
    /// Display name presented at approval time.
    pub name: String,
    /// When the user approved the connection.
    pub connected_at: DateTime<Utc>,
}

/// Directory of connected origins, persisted one record per connection.
pub struct ConnectedDirectory {
    store: JsonStore,
    /// Keyed by origin.
    inner: Mutex<HashMap<String, ConnectedDApp>>,
}

impl ConnectedDirectory {
    /// Open the directory, loading persisted records.
    pub fn open(store: JsonStore) -> WalletResult<Self> {
        let mut by_origin = HashMap::new();
        for id in store.list_ids(store.paths().connections_dir())? {
            match store.read_json::<ConnectedDApp>(store.paths().connection(&id)) {
                Ok(record) => {
                    by_origin.insert(record.origin.clone(), record);
                }
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "Skipping unreadable connection record")
                }
            }
        }

        Ok(Self {
            store,
            inner: Mutex::new(by_origin),
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, HashMap<String, ConnectedDApp>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an approved origin. Idempotent: an existing entry for the
    /// origin is returned unchanged, so a racing duplicate approval cannot
    /// double-add.
    pub fn upsert(&self, origin: &str, name: &str) -> WalletResult<ConnectedDApp> {
        let mut inner = self.lock_inner();

        if let Some(existing) = inner.get(origin) {
            return Ok(existing.clone());
        }

        let record = ConnectedDApp {
            id: Uuid::new_v4().to_string(),
            origin: origin.to_string(),
            name: name.to_string(),
            connected_at: Utc::now(),
        };
        self.store
            .write_json(self.store.paths().connection(&record.id), &record)?;
        inner.insert(origin.to_string(), record.clone());

        info!(origin = %origin, "dApp connected");
        Ok(record)
    }

    /// Remove a connection by id.
    pub fn remove(&self, connection_id: &str) -> WalletResult<()> {
        let mut inner = self.lock_inner();

        let origin = inner
            .values()
            .find(|c| c.id == connection_id)
            .map(|c| c.origin.clone())
            .ok_or_else(|| WalletError::NotFound(format!("connection {connection_id}")))?;

        self.store
            .delete(self.store.paths().connection(connection_id))?;
        inner.remove(&origin);

        info!(origin = %origin, "dApp disconnected");
        Ok(())
    }

    /// All connected dApps, newest first.
    pub fn list(&self) -> Vec<ConnectedDApp> {
        let inner = self.lock_inner();
        let mut list: Vec<ConnectedDApp> = inner.values().cloned().collect();
        list.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        list
    }

    /// Whether an origin has a standing connection.
    pub fn is_connected(&self, origin: &str) -> bool {
        self.lock_inner().contains_key(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use std::env;
    use std::fs;

    fn test_directory() -> ConnectedDirectory {
        let dir = env::temp_dir().join(format!("test-connections-{}", Uuid::new_v4()));
        let mut store = JsonStore::new(StoragePaths::new(&dir));
        store.initialize().unwrap();
        ConnectedDirectory::open(store).unwrap()
    }

    fn cleanup(directory: &ConnectedDirectory) {
        let _ = fs::remove_dir_all(directory.store.paths().root());
    }

    #[test]
    fn upsert_is_idempotent_by_origin() {
        let directory = test_directory();

        let first = directory.upsert("https://dapp.example", "Example").unwrap();
        let second = directory.upsert("https://dapp.example", "Renamed").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Example");
        assert_eq!(directory.list().len(), 1);

        cleanup(&directory);
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let directory = test_directory();
        let err = directory.remove("missing").unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
        cleanup(&directory);
    }

    #[test]
    fn connection_survives_reopen() {
        let dir = env::temp_dir().join(format!("test-connections-{}", Uuid::new_v4()));
        let mut store = JsonStore::new(StoragePaths::new(&dir));
        store.initialize().unwrap();

        {
            let directory = ConnectedDirectory::open(store.clone()).unwrap();
            directory.upsert("https://dapp.example", "Example").unwrap();
        }

        let reopened = ConnectedDirectory::open(store).unwrap();
        assert!(reopened.is_connected("https://dapp.example"));
        assert!(!reopened.is_connected("https://other.example"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn remove_then_not_connected() {
        let directory = test_directory();
        let record = directory.upsert("https://dapp.example", "Example").unwrap();

        directory.remove(&record.id).unwrap();
        assert!(!directory.is_connected("https://dapp.example"));
        assert!(directory.list().is_empty());

        cleanup(&directory);
    }
}
