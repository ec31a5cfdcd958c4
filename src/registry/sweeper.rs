// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Sweeper
//!
//! Background task that periodically expires overdue pending requests and
//! garbage-collects terminal entries into the tombstone cache. Lookup paths
//! also expire lazily, so the sweeper is a backstop for entries nobody is
//! observing (e.g. an abandoned caller whose receiver was dropped).
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::CorrelationRegistry;

/// Default interval between sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Background sweeper for the correlation registry.
pub struct ExpirySweeper {
    registry: Arc<CorrelationRegistry>,
    sweep_interval: Duration,
}

impl ExpirySweeper {
    /// Create a new sweeper for the given registry.
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self {
            registry,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Run the sweeper loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Expiry sweeper shutting down");
                return;
            }

            self.sweep_step();

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep: expire overdue entries, collect terminal ones.
    fn sweep_step(&self) {
        let expired = self.registry.expire_overdue();
        let collected = self.registry.gc_terminal();

        if expired > 0 || collected > 0 {
            debug!(expired, collected, "Sweeper pass complete");
        }
    }
}
