// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auto-Lock Watchdog
//!
//! Background task that locks the vault after the configured idle interval.
//! Any explicit user interaction resets the idle clock via
//! [`KeyVault::touch`]; the watchdog only compares elapsed idle time against
//! the threshold, so its tick interval bounds lock latency, not precision.
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown, the
//! same pattern as the registry's expiry sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::KeyVault;

/// Default interval between idle checks.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background watchdog that enforces the vault's auto-lock threshold.
pub struct AutoLockWatchdog {
    vault: Arc<KeyVault>,
    check_interval: Duration,
}

impl AutoLockWatchdog {
    /// Create a new watchdog for the given vault.
    pub fn new(vault: Arc<KeyVault>) -> Self {
        Self {
            vault,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_interval(vault: Arc<KeyVault>, check_interval: Duration) -> Self {
        Self {
            vault,
            check_interval,
        }
    }

    /// Run the watchdog loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(watchdog.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            "Auto-lock watchdog starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Auto-lock watchdog shutting down");
                return;
            }

            self.vault.maybe_autolock();

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Auto-lock watchdog shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonStore, StoragePaths};
    use std::env;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[tokio::test]
    async fn watchdog_locks_idle_vault() {
        let dir = env::temp_dir().join(format!("test-watchdog-{}", uuid::Uuid::new_v4()));
        let mut store = JsonStore::new(StoragePaths::new(&dir));
        store.initialize().unwrap();
        let vault = Arc::new(KeyVault::open(store).unwrap());

        vault.create(KEY, "pw", "Main").unwrap();
        vault.set_auto_lock_seconds(1).unwrap();
        assert!(!vault.is_locked());

        let shutdown = CancellationToken::new();
        let watchdog =
            AutoLockWatchdog::with_interval(vault.clone(), Duration::from_millis(50));
        let handle = tokio::spawn(watchdog.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(vault.is_locked());

        shutdown.cancel();
        handle.await.unwrap();
        let _ = std::fs::remove_dir_all(dir);
    }
}
