// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the persistent data layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent gateway data.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the gateway data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all persistent data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Vault Paths ==========

    /// Directory containing all wallet records.
    pub fn wallets_dir(&self) -> PathBuf {
        self.root.join("wallets")
    }

    /// Path to a specific wallet record file.
    pub fn wallet(&self, wallet_id: &str) -> PathBuf {
        self.wallets_dir().join(format!("{wallet_id}.json"))
    }

    /// Path to the vault metadata file (active wallet, auto-lock setting).
    pub fn vault_meta(&self) -> PathBuf {
        self.root.join("vault.json")
    }

    // ========== Connected Origin Paths ==========

    /// Directory containing connected dApp records.
    pub fn connections_dir(&self) -> PathBuf {
        self.root.join("connections")
    }

    /// Path to a specific connected dApp record file.
    pub fn connection(&self, connection_id: &str) -> PathBuf {
        self.connections_dir().join(format!("{connection_id}.json"))
    }

    // ========== Relay Paths ==========

    /// Directory containing persisted relay events.
    pub fn relay_dir(&self) -> PathBuf {
        self.root.join("relay")
    }

    /// Path to a persisted relay event, keyed by its numeric id.
    pub fn relay_event(&self, event_id: u64) -> PathBuf {
        self.relay_dir().join(format!("{event_id}.json"))
    }

    // ========== Channel Store ==========

    /// Path to the shared result-channel database.
    pub fn channel_db(&self) -> PathBuf {
        self.root.join("channel.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_root() {
        let paths = StoragePaths::new("/tmp/gw");
        assert_eq!(paths.wallet("abc"), PathBuf::from("/tmp/gw/wallets/abc.json"));
        assert_eq!(paths.relay_event(7), PathBuf::from("/tmp/gw/relay/7.json"));
        assert_eq!(paths.channel_db(), PathBuf::from("/tmp/gw/channel.redb"));
    }
}
