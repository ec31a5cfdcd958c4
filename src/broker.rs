// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Approval Broker
//!
//! The human-facing decision surface. Reads a pending request by id,
//! refuses to act while the vault is locked, and turns a binary
//! accept/reject into a committed, exactly-once resolution:
//!
//! - the registry's compare-and-swap is the commit point; duplicate clicks
//!   and racing delivery channels collapse to `AlreadyResolved`,
//! - connect-class approvals upsert the connected-origin directory,
//! - sign-class approvals invoke the vault's session signing capability,
//! - iframe-owned requests get redundant delivery (storage channel write
//!   plus authenticated bus message),
//! - redirect flows get the outcome appended to their return URL.
//!
//! Relay proposals/requests follow the same locked-gate and signing paths
//! but commit through the relay hub's consumed flag instead of the registry.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::chains::ChainRegistry;
use crate::connections::ConnectedDirectory;
use crate::error::{WalletError, WalletResult};
use crate::notify::{DecisionNotice, NotificationSink};
use crate::provider::{ApprovalClass, WalletMethod};
use crate::registry::{
    CorrelationRegistry, PendingRequest, RequestOutcome, RequestStatus, TransportKind,
};
use crate::rpc::RpcBridge;
use crate::storage::ChannelStore;
use crate::transport::relay::{RelayEvent, RelayHub};
use crate::transport::same_context::{append_redirect_result, redirect_result_for};
use crate::transport::MessageBus;
use crate::vault::KeyVault;

/// Result of a committed decision, for the approval UI.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecisionOutcome {
    /// The decided request id.
    pub request_id: String,
    /// Terminal status after the decision.
    pub status: RequestStatus,
    /// The outcome as delivered to the caller.
    pub outcome: RequestOutcome,
    /// Return URL with the encoded result, for redirect flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// The approval broker.
pub struct ApprovalBroker {
    vault: Arc<KeyVault>,
    registry: Arc<CorrelationRegistry>,
    connections: Arc<ConnectedDirectory>,
    chains: Arc<ChainRegistry>,
    relay: Arc<RelayHub>,
    bus: Arc<MessageBus>,
    channel: Arc<ChannelStore>,
    rpc: Arc<RpcBridge>,
    notifier: Arc<NotificationSink>,
}

impl ApprovalBroker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vault: Arc<KeyVault>,
        registry: Arc<CorrelationRegistry>,
        connections: Arc<ConnectedDirectory>,
        chains: Arc<ChainRegistry>,
        relay: Arc<RelayHub>,
        bus: Arc<MessageBus>,
        channel: Arc<ChannelStore>,
        rpc: Arc<RpcBridge>,
        notifier: Arc<NotificationSink>,
    ) -> Self {
        Self {
            vault,
            registry,
            connections,
            chains,
            relay,
            bus,
            channel,
            rpc,
            notifier,
        }
    }

    /// Read a pending request for presentation.
    ///
    /// Refuses while the vault is locked; the UI redirects to
    /// authentication first. The caller origin and params are presented
    /// exactly as recorded, never mutated.
    pub fn view(&self, request_id: &str) -> WalletResult<PendingRequest> {
        if self.vault.is_locked() {
            return Err(WalletError::VaultLocked);
        }
        self.registry.get(request_id)
    }

    /// Commit a binary decision for a registry-tracked request.
    pub async fn decide(
        &self,
        request_id: &str,
        approve: bool,
        wallet_id: Option<&str>,
    ) -> WalletResult<DecisionOutcome> {
        if self.vault.is_locked() {
            return Err(WalletError::VaultLocked);
        }
        self.vault.touch();

        let entry = self.registry.get(request_id)?;
        let method = WalletMethod::parse(&entry.method)?;

        let outcome = if approve {
            match self
                .compute_approval_result(&method, &entry.params, &entry.origin, wallet_id)
                .await
            {
                Ok(value) => RequestOutcome::Approved(value),
                // The approval could not be honored (bad params, upstream
                // failure); the caller gets the structured reason
                Err(e) => RequestOutcome::rejected(&e),
            }
        } else {
            RequestOutcome::rejected(&WalletError::UserRejected)
        };

        // Commit point: exactly one decision per request id
        let committed = self.registry.resolve(request_id, outcome)?;
        let approved = matches!(committed, RequestOutcome::Approved(_));

        // Connect-class approvals authorize the origin for silent reads.
        // Read-only methods only reach the pipeline when the origin was not
        // yet connected, so their approval is a connect decision too.
        if approved
            && matches!(
                method.approval_class(),
                ApprovalClass::Connect | ApprovalClass::ReadOnly
            )
        {
            self.connections
                .upsert(&entry.origin, &display_name(&entry.origin))?;
        }

        // Redundant delivery for iframe-owned requests: the subframe may
        // have lost its in-memory waiter during the approval interval
        if entry.transport == TransportKind::Iframe {
            if let Err(e) = self.channel.publish(request_id, &committed) {
                warn!(request_id = %request_id, error = %e, "Storage channel write failed");
            }
            self.bus
                .publish_resolution(request_id, &entry.origin, committed.clone());
        }

        let return_url = self.build_return_url(&entry, &committed, wallet_id)?;
        self.send_notice(
            request_id.to_string(),
            entry.method.clone(),
            entry.origin.clone(),
            approved,
        );

        Ok(DecisionOutcome {
            request_id: request_id.to_string(),
            status: if approved {
                RequestStatus::Approved
            } else {
                RequestStatus::Rejected
            },
            outcome: committed,
            return_url,
        })
    }

    /// Compute the value delivered to the caller on approval.
    async fn compute_approval_result(
        &self,
        method: &WalletMethod,
        params: &serde_json::Value,
        _origin: &str,
        wallet_id: Option<&str>,
    ) -> WalletResult<serde_json::Value> {
        match method {
            WalletMethod::RequestAccounts | WalletMethod::Accounts => {
                let address = self.vault.address_of(wallet_id)?;
                Ok(serde_json::json!({
                    "accounts": [address],
                    "chainId": self.chains.active_chain_id(),
                }))
            }
            WalletMethod::ChainId => Ok(serde_json::json!(self.chains.active_chain_id())),
            WalletMethod::ReadPassthrough(name) => {
                let chain = self.chains.active();
                let rpc_url = chain.rpc_url.ok_or_else(|| {
                    WalletError::Rpc(format!(
                        "no rpc endpoint configured for chain {}",
                        chain.chain_id
                    ))
                })?;
                self.rpc.passthrough(&rpc_url, name, params.clone()).await
            }

            WalletMethod::PersonalSign => {
                let message = bytes_param(params, 0)?;
                let signature = self.vault.sign_personal(wallet_id, &message)?;
                Ok(serde_json::json!(signature))
            }
            WalletMethod::EthSign => {
                let message = bytes_param(params, 1)?;
                let signature = self.vault.sign_personal(wallet_id, &message)?;
                Ok(serde_json::json!(signature))
            }
            WalletMethod::SignTypedData => {
                let typed = typed_data_param(params)?;
                let signature = self.vault.sign_typed_data(wallet_id, &typed)?;
                Ok(serde_json::json!(signature))
            }
            WalletMethod::SendTransaction => {
                let chain = self.chains.active();
                let rpc_url = chain.rpc_url.ok_or_else(|| {
                    WalletError::Rpc(format!(
                        "no rpc endpoint configured for chain {}",
                        chain.chain_id
                    ))
                })?;
                self.rpc.dispatch_transaction(&rpc_url, params.clone()).await
            }

            WalletMethod::SwitchChain | WalletMethod::AddChain => Err(WalletError::InvalidInput(
                "local-state methods never enter the pipeline".into(),
            )),
        }
    }

    /// Build the redirect-continuation URL for requests that carried a
    /// return pointer.
    fn build_return_url(
        &self,
        entry: &PendingRequest,
        committed: &RequestOutcome,
        wallet_id: Option<&str>,
    ) -> WalletResult<Option<String>> {
        let Some(return_to) = &entry.return_to else {
            return Ok(None);
        };

        let disclosing = matches!(
            WalletMethod::parse(&entry.method)?.approval_class(),
            ApprovalClass::Connect | ApprovalClass::ReadOnly
        );
        let accounts = if matches!(committed, RequestOutcome::Approved(_)) && disclosing {
            vec![self.vault.address_of(wallet_id)?]
        } else {
            Vec::new()
        };

        let payload = redirect_result_for(committed, accounts, self.chains.active_chain_id());
        let url = append_redirect_result(return_to, &payload)?;
        Ok(Some(url.to_string()))
    }

    fn send_notice(&self, request_id: String, method: String, origin: String, approved: bool) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier
                .notify(DecisionNotice {
                    request_id,
                    method,
                    origin,
                    approved,
                    decided_at: Utc::now(),
                })
                .await;
        });
    }

    // ========== Relay decisions ==========

    /// Commit a decision on a relay session proposal.
    pub async fn decide_relay_proposal(
        &self,
        event_id: u64,
        approve: bool,
        wallet_id: Option<&str>,
    ) -> WalletResult<serde_json::Value> {
        if self.vault.is_locked() {
            return Err(WalletError::VaultLocked);
        }
        self.vault.touch();

        // Read metadata before the decision consumes the event
        let stored = self.relay.event(event_id)?;
        let RelayEvent::SessionProposal {
            proposer_name,
            proposer_url,
            ..
        } = &stored.event
        else {
            return Err(WalletError::NotFound(format!("relay proposal {event_id}")));
        };
        let (proposer_name, proposer_url) = (proposer_name.clone(), proposer_url.clone());

        if approve {
            let address = self.vault.address_of(wallet_id)?;
            let grant = self
                .relay
                .approve_proposal(event_id, std::slice::from_ref(&address))
                .await?;
            self.connections.upsert(&proposer_url, &proposer_name)?;
            self.send_notice(
                event_id.to_string(),
                "session_proposal".into(),
                proposer_url,
                true,
            );
            Ok(grant)
        } else {
            self.relay.reject_proposal(event_id).await?;
            self.send_notice(
                event_id.to_string(),
                "session_proposal".into(),
                proposer_url,
                false,
            );
            Ok(serde_json::Value::Null)
        }
    }

    /// Commit a decision on a relay session request.
    pub async fn decide_relay_request(
        &self,
        event_id: u64,
        approve: bool,
        wallet_id: Option<&str>,
    ) -> WalletResult<serde_json::Value> {
        if self.vault.is_locked() {
            return Err(WalletError::VaultLocked);
        }
        self.vault.touch();

        let stored = self.relay.event(event_id)?;
        let RelayEvent::SessionRequest {
            method,
            params,
            topic,
            ..
        } = &stored.event
        else {
            return Err(WalletError::NotFound(format!("relay request {event_id}")));
        };

        if !approve {
            let response = self
                .relay
                .reject_request(event_id, &WalletError::UserRejected)
                .await?;
            self.send_notice(event_id.to_string(), method.clone(), topic.clone(), false);
            return Ok(response);
        }

        let parsed = WalletMethod::parse(method)?;
        let response = match self
            .compute_approval_result(&parsed, params, topic, wallet_id)
            .await
        {
            Ok(result) => self.relay.approve_request(event_id, result).await?,
            Err(e) => self.relay.reject_request(event_id, &e).await?,
        };
        self.send_notice(
            event_id.to_string(),
            method.clone(),
            topic.clone(),
            matches!(response.get("result"), Some(_)),
        );
        Ok(response)
    }
}

/// Human-readable name for an origin (its host, falling back to the raw
/// string).
fn display_name(origin: &str) -> String {
    url::Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| origin.to_string())
}

/// Decode a hex-or-text byte param at `index`.
fn bytes_param(params: &serde_json::Value, index: usize) -> WalletResult<Vec<u8>> {
    let raw = params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| WalletError::InvalidInput(format!("missing param {index}")))?;

    if let Some(hex) = raw.strip_prefix("0x") {
        alloy::hex::decode(hex)
            .map_err(|e| WalletError::InvalidInput(format!("bad hex param: {e}")))
    } else {
        Ok(raw.as_bytes().to_vec())
    }
}

/// Extract the typed-data payload (object or JSON string) from params.
fn typed_data_param(params: &serde_json::Value) -> WalletResult<serde_json::Value> {
    let raw = params
        .get(1)
        .ok_or_else(|| WalletError::InvalidInput("missing typed data param".into()))?;
    match raw {
        serde_json::Value::String(s) => serde_json::from_str(s)
            .map_err(|e| WalletError::InvalidInput(format!("bad typed data: {e}"))),
        other => Ok(other.clone()),
    }
}
