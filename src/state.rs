// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application state: every component owned explicitly behind one
//! coordinating struct, wired once at startup. No ambient globals.

use std::sync::Arc;

use crate::broker::ApprovalBroker;
use crate::chains::ChainRegistry;
use crate::config::GatewayConfig;
use crate::connections::ConnectedDirectory;
use crate::error::WalletResult;
use crate::handoff::HandoffStore;
use crate::notify::NotificationSink;
use crate::provider::ProviderService;
use crate::registry::CorrelationRegistry;
use crate::rpc::RpcBridge;
use crate::storage::{ChannelStore, JsonStore, StoragePaths};
use crate::transport::iframe::IframeAdapter;
use crate::transport::relay::RelayHub;
use crate::transport::same_context::SameContextAdapter;
use crate::transport::MessageBus;
use crate::vault::KeyVault;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub vault: Arc<KeyVault>,
    pub registry: Arc<CorrelationRegistry>,
    pub connections: Arc<ConnectedDirectory>,
    pub chains: Arc<ChainRegistry>,
    pub handoffs: Arc<HandoffStore>,
    pub bus: Arc<MessageBus>,
    pub channel: Arc<ChannelStore>,
    pub relay: Arc<RelayHub>,
    pub rpc: Arc<RpcBridge>,
    pub same_context: Arc<SameContextAdapter>,
    pub iframe: Arc<IframeAdapter>,
    pub provider: Arc<ProviderService>,
    pub broker: Arc<ApprovalBroker>,
}

impl AppState {
    /// Wire up all components over the configured data directory.
    pub fn initialize(config: GatewayConfig) -> WalletResult<Self> {
        let mut store = JsonStore::new(StoragePaths::new(&config.data_dir));
        store.initialize()?;

        let vault = Arc::new(KeyVault::open(store.clone())?);
        let registry = Arc::new(CorrelationRegistry::new());
        let connections = Arc::new(ConnectedDirectory::open(store.clone())?);
        let chains = Arc::new(ChainRegistry::new());
        let handoffs = Arc::new(HandoffStore::new());
        let bus = Arc::new(MessageBus::new());
        let channel = Arc::new(ChannelStore::open(&store.paths().channel_db())?);
        let relay = Arc::new(RelayHub::new(store.clone(), config.relay_bridge_url.clone()));
        let rpc = Arc::new(RpcBridge::new());
        let notifier = Arc::new(NotificationSink::from_endpoint(
            config.notify_webhook_url.clone(),
        ));

        let same_context = Arc::new(SameContextAdapter::new(
            registry.clone(),
            config.approval_base_url.clone(),
        ));
        let iframe = Arc::new(IframeAdapter::new(
            registry.clone(),
            bus.clone(),
            channel.clone(),
            config.approval_base_url.clone(),
        ));
        let provider = Arc::new(ProviderService::new(
            vault.clone(),
            connections.clone(),
            chains.clone(),
            rpc.clone(),
        ));
        let broker = Arc::new(ApprovalBroker::new(
            vault.clone(),
            registry.clone(),
            connections.clone(),
            chains.clone(),
            relay.clone(),
            bus.clone(),
            channel.clone(),
            rpc.clone(),
            notifier,
        ));

        Ok(Self {
            config: Arc::new(config),
            vault,
            registry,
            connections,
            chains,
            handoffs,
            bus,
            channel,
            relay,
            rpc,
            same_context,
            iframe,
            provider,
            broker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn initialize_wires_all_components() {
        let dir = env::temp_dir().join(format!("test-state-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();

        assert!(state.vault.is_locked());
        assert!(state.registry.is_empty());
        assert!(state.connections.list().is_empty());
        assert_eq!(state.chains.active_chain_id(), "0x1");

        let _ = fs::remove_dir_all(dir);
    }
}
