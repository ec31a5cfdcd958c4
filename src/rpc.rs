// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # RPC Bridge
//!
//! Boundary to the upstream execution node. The gateway never constructs or
//! broadcasts transactions itself; read-only calls are passed through
//! verbatim for connected origins, and approved `eth_sendTransaction`
//! requests are forwarded to the upstream node that owns them.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::{
    network::Ethereum,
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
};

use crate::error::{WalletError, WalletResult};

/// HTTP provider type (with all default fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Methods the bridge will pass through without approval for connected
/// origins.
const READ_ONLY_METHODS: &[&str] = &[
    "eth_blockNumber",
    "eth_call",
    "eth_estimateGas",
    "eth_gasPrice",
    "eth_feeHistory",
    "net_version",
    "web3_clientVersion",
];

/// Whether a method is a read-only passthrough candidate.
pub fn is_read_only_method(method: &str) -> bool {
    method.starts_with("eth_get") || READ_ONLY_METHODS.contains(&method)
}

/// Upstream RPC boundary with one provider per endpoint.
#[derive(Default)]
pub struct RpcBridge {
    providers: Mutex<HashMap<String, Arc<HttpProvider>>>,
}

impl RpcBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_providers(&self) -> MutexGuard<'_, HashMap<String, Arc<HttpProvider>>> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn provider_for(&self, rpc_url: &str) -> WalletResult<Arc<HttpProvider>> {
        let mut providers = self.lock_providers();
        if let Some(provider) = providers.get(rpc_url) {
            return Ok(provider.clone());
        }

        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| WalletError::Rpc(format!("bad rpc url: {e}")))?;
        let provider = Arc::new(ProviderBuilder::new().connect_http(url));
        providers.insert(rpc_url.to_string(), provider.clone());
        Ok(provider)
    }

    /// Forward a call verbatim to the upstream node.
    pub async fn passthrough(
        &self,
        rpc_url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> WalletResult<serde_json::Value> {
        let provider = self.provider_for(rpc_url)?;
        provider
            .raw_request::<_, serde_json::Value>(Cow::Owned(method.to_string()), params)
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))
    }

    /// Forward an approved transaction request to the upstream node, which
    /// owns construction and broadcast. Returns the node's result (the
    /// transaction hash).
    pub async fn dispatch_transaction(
        &self,
        rpc_url: &str,
        params: serde_json::Value,
    ) -> WalletResult<serde_json::Value> {
        self.passthrough(rpc_url, "eth_sendTransaction", params).await
    }
}
