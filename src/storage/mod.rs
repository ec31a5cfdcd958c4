// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage Module
//!
//! All gateway data lives under one data root (default `/data`):
//!
//! ```text
//! /data/
//!   vault.json            # Vault metadata (active wallet, auto-lock)
//!   wallets/
//!     {wallet_id}.json    # Wallet record (secrets sealed by the vault cipher)
//!   connections/
//!     {connection_id}.json
//!   relay/
//!     {event_id}.json     # Inbound relay events, keyed by numeric id
//!   channel.redb          # Shared result-channel store (iframe delivery)
//! ```
//!
//! Wallet secrets are sealed with the vault cipher before they reach disk;
//! the JSON layer never sees plaintext key material.

pub mod channel_db;
pub mod paths;
pub mod store;

pub use channel_db::{ChannelDbError, ChannelDbResult, ChannelStore};
pub use paths::StoragePaths;
pub use store::{JsonStore, StoreError, StoreResult};
