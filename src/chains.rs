// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Registry
//!
//! Local chain list backing `eth_chainId`, `wallet_switchEthereumChain`, and
//! `wallet_addEthereumChain`. Pure local state: switching or adding a chain
//! makes no remote call.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{WalletError, WalletResult};

/// A known chain.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChainInfo {
    /// Hex chain id (e.g. `0x1`), lowercase.
    pub chain_id: String,
    /// Display name.
    pub name: String,
    /// RPC endpoint for the read-only passthrough boundary, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

struct ChainsInner {
    chains: HashMap<String, ChainInfo>,
    active: String,
}

/// Registry of known chains and the active one.
pub struct ChainRegistry {
    inner: Mutex<ChainsInner>,
}

fn normalize_chain_id(chain_id: &str) -> WalletResult<String> {
    let id = chain_id.trim().to_lowercase();
    let digits = id
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidInput(format!("chain id {chain_id} is not 0x-hex")))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WalletError::InvalidInput(format!(
            "chain id {chain_id} is not 0x-hex"
        )));
    }
    Ok(id)
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainRegistry {
    /// Create a registry seeded with Ethereum mainnet as the active chain.
    pub fn new() -> Self {
        let mainnet = ChainInfo {
            chain_id: "0x1".to_string(),
            name: "Ethereum Mainnet".to_string(),
            rpc_url: None,
        };
        let mut chains = HashMap::new();
        chains.insert(mainnet.chain_id.clone(), mainnet);

        Self {
            inner: Mutex::new(ChainsInner {
                chains,
                active: "0x1".to_string(),
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, ChainsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The active chain.
    pub fn active(&self) -> ChainInfo {
        let inner = self.lock_inner();
        inner.chains[&inner.active].clone()
    }

    /// The active hex chain id.
    pub fn active_chain_id(&self) -> String {
        self.lock_inner().active.clone()
    }

    /// Switch to a known chain. Unknown ids fail `NotFound` and leave the
    /// active chain unchanged.
    pub fn switch(&self, chain_id: &str) -> WalletResult<ChainInfo> {
        let id = normalize_chain_id(chain_id)?;
        let mut inner = self.lock_inner();
        let info = inner
            .chains
            .get(&id)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(format!("chain {chain_id}")))?;
        inner.active = id;
        info!(chain_id = %info.chain_id, "Active chain switched");
        Ok(info)
    }

    /// Add (or update) a chain definition.
    pub fn add(&self, chain: ChainInfo) -> WalletResult<ChainInfo> {
        let id = normalize_chain_id(&chain.chain_id)?;
        if chain.name.trim().is_empty() {
            return Err(WalletError::InvalidInput("chain name is required".into()));
        }

        let normalized = ChainInfo {
            chain_id: id.clone(),
            name: chain.name,
            rpc_url: chain.rpc_url,
        };
        self.lock_inner().chains.insert(id, normalized.clone());
        info!(chain_id = %normalized.chain_id, "Chain added");
        Ok(normalized)
    }

    /// All known chains.
    pub fn list(&self) -> Vec<ChainInfo> {
        let inner = self.lock_inner();
        let mut list: Vec<ChainInfo> = inner.chains.values().cloned().collect();
        list.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_with_mainnet_active() {
        let registry = ChainRegistry::new();
        assert_eq!(registry.active_chain_id(), "0x1");
    }

    #[test]
    fn switch_to_unknown_chain_keeps_active() {
        let registry = ChainRegistry::new();
        let err = registry.switch("0x89").unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
        assert_eq!(registry.active_chain_id(), "0x1");
    }

    #[test]
    fn add_then_switch() {
        let registry = ChainRegistry::new();
        registry
            .add(ChainInfo {
                chain_id: "0x89".into(),
                name: "Polygon".into(),
                rpc_url: Some("https://polygon-rpc.example".into()),
            })
            .unwrap();

        let active = registry.switch("0x89").unwrap();
        assert_eq!(active.name, "Polygon");
        assert_eq!(registry.active_chain_id(), "0x89");
    }

    #[test]
    fn chain_ids_are_normalized_lowercase() {
        let registry = ChainRegistry::new();
        registry
            .add(ChainInfo {
                chain_id: "0xA".into(),
                name: "Optimism".into(),
                rpc_url: None,
            })
            .unwrap();

        assert!(registry.switch("0xa").is_ok());
        assert_eq!(registry.active_chain_id(), "0xa");
    }

    #[test]
    fn malformed_chain_id_is_invalid_input() {
        let registry = ChainRegistry::new();
        assert!(matches!(
            registry.switch("137"),
            Err(WalletError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.add(ChainInfo {
                chain_id: "0x".into(),
                name: "Broken".into(),
                rpc_url: None,
            }),
            Err(WalletError::InvalidInput(_))
        ));
    }
}
