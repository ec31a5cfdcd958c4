// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay adapter for the external pairing protocol.
//!
//! Remote dApps that share no browser context reach the wallet through a
//! relay. Inbound events (`session_proposal`, `session_request`,
//! `session_delete`, `session_update`) are persisted by their numeric id
//! before any UI involvement, so the approval surface can retrieve them
//! after a cold load. Decisions answer over the existing session topic:
//! proposals with a computed namespace/account grant, requests with a
//! JSON-RPC-shaped result or error.
//!
//! The underlying session client is a lazily-initialized singleton behind an
//! async get-or-init accessor; concurrent callers share one initialization
//! and exactly one client exists per process.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use url::Url;
use utoipa::ToSchema;

use crate::error::{Rejection, WalletError, WalletResult};
use crate::storage::JsonStore;

/// Wallet methods granted to relay sessions.
const GRANTED_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "personal_sign",
    "eth_sign",
    "eth_signTypedData",
];

/// Provider events granted to relay sessions.
const GRANTED_EVENTS: &[&str] = &["accountsChanged", "chainChanged"];

/// An inbound relay event, as delivered by the pairing protocol.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    SessionProposal {
        id: u64,
        topic: String,
        proposer_name: String,
        proposer_url: String,
        #[serde(default)]
        chains: Vec<String>,
        #[serde(default)]
        methods: Vec<String>,
        #[serde(default)]
        events: Vec<String>,
    },
    SessionRequest {
        id: u64,
        topic: String,
        method: String,
        params: serde_json::Value,
    },
    SessionDelete {
        id: u64,
        topic: String,
    },
    SessionUpdate {
        id: u64,
        topic: String,
        namespaces: serde_json::Value,
    },
}

impl RelayEvent {
    pub fn id(&self) -> u64 {
        match self {
            RelayEvent::SessionProposal { id, .. }
            | RelayEvent::SessionRequest { id, .. }
            | RelayEvent::SessionDelete { id, .. }
            | RelayEvent::SessionUpdate { id, .. } => *id,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            RelayEvent::SessionProposal { topic, .. }
            | RelayEvent::SessionRequest { topic, .. }
            | RelayEvent::SessionDelete { topic, .. }
            | RelayEvent::SessionUpdate { topic, .. } => topic,
        }
    }
}

/// A persisted relay event with its consumption state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredRelayEvent {
    pub event: RelayEvent,
    pub received_at: DateTime<Utc>,
    /// Set once a decision has been sent for this event.
    pub consumed: bool,
}

/// Recorded outbound call, for tests.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum SocketCall {
    ApproveSession {
        topic: String,
        namespaces: serde_json::Value,
    },
    RejectSession {
        topic: String,
    },
    Respond {
        topic: String,
        response: serde_json::Value,
    },
}

/// Wire client for the relay bridge. The cryptographic session handshake
/// happens on the far side of this boundary.
pub enum RelaySocket {
    /// HTTP bridge.
    Http {
        http: reqwest::Client,
        bridge_url: Url,
    },
    /// No bridge configured; decisions fail with a relay error.
    Disabled,
    /// Records calls instead of sending them.
    #[cfg(test)]
    Recording(Arc<Mutex<Vec<SocketCall>>>),
}

impl RelaySocket {
    async fn post(&self, path: &str, body: &serde_json::Value) -> WalletResult<()> {
        match self {
            RelaySocket::Http { http, bridge_url } => {
                let url = bridge_url
                    .join(path)
                    .map_err(|e| WalletError::Relay(format!("bad bridge path: {e}")))?;
                http.post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| WalletError::Relay(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| WalletError::Relay(e.to_string()))?;
                Ok(())
            }
            RelaySocket::Disabled => Err(WalletError::Relay("relay bridge not configured".into())),
            #[cfg(test)]
            RelaySocket::Recording(_) => Ok(()),
        }
    }

    /// Approve a session proposal with the granted namespaces.
    pub async fn approve_session(
        &self,
        topic: &str,
        namespaces: &serde_json::Value,
    ) -> WalletResult<()> {
        #[cfg(test)]
        if let RelaySocket::Recording(calls) = self {
            calls.lock().unwrap().push(SocketCall::ApproveSession {
                topic: topic.to_string(),
                namespaces: namespaces.clone(),
            });
            return Ok(());
        }
        self.post(
            "session/approve",
            &serde_json::json!({"topic": topic, "namespaces": namespaces}),
        )
        .await
    }

    /// Reject a session proposal.
    pub async fn reject_session(&self, topic: &str, reason: &Rejection) -> WalletResult<()> {
        #[cfg(test)]
        if let RelaySocket::Recording(calls) = self {
            calls.lock().unwrap().push(SocketCall::RejectSession {
                topic: topic.to_string(),
            });
            return Ok(());
        }
        self.post(
            "session/reject",
            &serde_json::json!({"topic": topic, "reason": reason}),
        )
        .await
    }

    /// Send a JSON-RPC-shaped response over a session topic.
    pub async fn respond(&self, topic: &str, response: &serde_json::Value) -> WalletResult<()> {
        #[cfg(test)]
        if let RelaySocket::Recording(calls) = self {
            calls.lock().unwrap().push(SocketCall::Respond {
                topic: topic.to_string(),
                response: response.clone(),
            });
            return Ok(());
        }
        self.post(
            "session/respond",
            &serde_json::json!({"topic": topic, "response": response}),
        )
        .await
    }
}

/// The singleton session client.
pub struct RelayClient {
    socket: RelaySocket,
}

impl RelayClient {
    pub fn socket(&self) -> &RelaySocket {
        &self.socket
    }
}

/// Hub owning event persistence and the lazily-initialized relay client.
pub struct RelayHub {
    store: JsonStore,
    bridge_url: Option<Url>,
    client: OnceCell<Arc<RelayClient>>,
    /// Serializes consume transitions so racing decisions can't both win.
    consume_guard: Mutex<()>,
}

impl RelayHub {
    pub fn new(store: JsonStore, bridge_url: Option<Url>) -> Self {
        Self {
            store,
            bridge_url,
            client: OnceCell::new(),
            consume_guard: Mutex::new(()),
        }
    }

    #[cfg(test)]
    fn with_socket(store: JsonStore, socket: RelaySocket) -> Self {
        Self {
            store,
            bridge_url: None,
            client: OnceCell::new_with(Some(Arc::new(RelayClient { socket }))),
            consume_guard: Mutex::new(()),
        }
    }

    /// Get or initialize the relay client.
    ///
    /// Safe to call redundantly from every entry point; concurrent callers
    /// share one in-flight initialization and one client instance.
    pub async fn client(&self) -> WalletResult<Arc<RelayClient>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let socket = match &self.bridge_url {
                    Some(url) => {
                        info!(bridge = %url, "Relay client initializing");
                        RelaySocket::Http {
                            http: reqwest::Client::new(),
                            bridge_url: url.clone(),
                        }
                    }
                    None => {
                        warn!("No relay bridge configured; relay decisions will fail");
                        RelaySocket::Disabled
                    }
                };
                Ok::<_, WalletError>(Arc::new(RelayClient { socket }))
            })
            .await?;
        Ok(client.clone())
    }

    // ========== Event persistence ==========

    /// Persist an inbound event keyed by its numeric id.
    ///
    /// Idempotent: a replayed id returns the stored record unchanged, so a
    /// replay can never reset a consumed decision.
    pub fn ingest(&self, event: RelayEvent) -> WalletResult<StoredRelayEvent> {
        let path = self.store.paths().relay_event(event.id());
        if self.store.exists(&path) {
            return Ok(self.store.read_json(&path)?);
        }

        let stored = StoredRelayEvent {
            received_at: Utc::now(),
            consumed: false,
            event,
        };
        self.store.write_json(&path, &stored)?;
        info!(event_id = stored.event.id(), topic = %stored.event.topic(), "Relay event persisted");
        Ok(stored)
    }

    /// Retrieve a persisted event by numeric id.
    pub fn event(&self, event_id: u64) -> WalletResult<StoredRelayEvent> {
        let path = self.store.paths().relay_event(event_id);
        if !self.store.exists(&path) {
            return Err(WalletError::NotFound(format!("relay event {event_id}")));
        }
        Ok(self.store.read_json(path)?)
    }

    /// Mark an event consumed. This is the commit point of a relay decision:
    /// a second attempt fails with `AlreadyResolved`.
    fn consume(&self, event_id: u64) -> WalletResult<StoredRelayEvent> {
        let _guard = self.consume_guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut stored = self.event(event_id)?;
        if stored.consumed {
            return Err(WalletError::AlreadyResolved);
        }
        stored.consumed = true;
        self.store
            .write_json(self.store.paths().relay_event(event_id), &stored)?;
        Ok(stored)
    }

    // ========== Proposal decisions ==========

    /// Approve a session proposal, granting the given account addresses.
    ///
    /// Computes the namespace grant and hands it to the relay client, which
    /// performs the session handshake. Returns the grant.
    pub async fn approve_proposal(
        &self,
        event_id: u64,
        addresses: &[String],
    ) -> WalletResult<serde_json::Value> {
        let stored = self.consume(event_id)?;
        let RelayEvent::SessionProposal {
            topic,
            chains,
            methods,
            events,
            ..
        } = &stored.event
        else {
            return Err(WalletError::NotFound(format!(
                "relay proposal {event_id}"
            )));
        };

        let chains = if chains.is_empty() {
            vec!["eip155:1".to_string()]
        } else {
            chains.clone()
        };
        let accounts: Vec<String> = chains
            .iter()
            .flat_map(|chain| addresses.iter().map(move |addr| format!("{chain}:{addr}")))
            .collect();
        let methods: Vec<String> = if methods.is_empty() {
            GRANTED_METHODS.iter().map(|m| m.to_string()).collect()
        } else {
            methods.clone()
        };
        let events: Vec<String> = if events.is_empty() {
            GRANTED_EVENTS.iter().map(|e| e.to_string()).collect()
        } else {
            events.clone()
        };

        let namespaces = serde_json::json!({
            "eip155": {
                "chains": chains,
                "accounts": accounts,
                "methods": methods,
                "events": events,
            }
        });

        let client = self.client().await?;
        client.socket().approve_session(topic, &namespaces).await?;

        info!(event_id, topic = %topic, "Relay session approved");
        Ok(namespaces)
    }

    /// Reject a session proposal.
    pub async fn reject_proposal(&self, event_id: u64) -> WalletResult<()> {
        let stored = self.consume(event_id)?;
        let RelayEvent::SessionProposal { topic, .. } = &stored.event else {
            return Err(WalletError::NotFound(format!(
                "relay proposal {event_id}"
            )));
        };

        let client = self.client().await?;
        client
            .socket()
            .reject_session(topic, &Rejection::from(&WalletError::UserRejected))
            .await?;

        info!(event_id, topic = %topic, "Relay session rejected");
        Ok(())
    }

    // ========== Request decisions ==========

    /// Approve a session request, answering with a JSON-RPC-shaped result.
    pub async fn approve_request(
        &self,
        event_id: u64,
        result: serde_json::Value,
    ) -> WalletResult<serde_json::Value> {
        let stored = self.consume(event_id)?;
        let RelayEvent::SessionRequest { topic, .. } = &stored.event else {
            return Err(WalletError::NotFound(format!("relay request {event_id}")));
        };

        let response = serde_json::json!({
            "id": event_id,
            "jsonrpc": "2.0",
            "result": result,
        });
        let client = self.client().await?;
        client.socket().respond(topic, &response).await?;

        info!(event_id, topic = %topic, "Relay request approved");
        Ok(response)
    }

    /// Reject a session request with a JSON-RPC-shaped error.
    pub async fn reject_request(
        &self,
        event_id: u64,
        reason: &WalletError,
    ) -> WalletResult<serde_json::Value> {
        let stored = self.consume(event_id)?;
        let RelayEvent::SessionRequest { topic, .. } = &stored.event else {
            return Err(WalletError::NotFound(format!("relay request {event_id}")));
        };

        let rejection = Rejection::from(reason);
        let response = serde_json::json!({
            "id": event_id,
            "jsonrpc": "2.0",
            "error": {"code": rejection.code, "message": rejection.message},
        });
        let client = self.client().await?;
        client.socket().respond(topic, &response).await?;

        info!(event_id, topic = %topic, "Relay request rejected");
        Ok(response)
    }
}
