// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-origin iframe adapter.
//!
//! A sandboxed, different-origin frame cannot navigate the wallet window
//! directly nor share storage synchronously, and it may be torn down by a
//! navigation while the human decides. Delivery is therefore redundant: a
//! message-channel listener (validated against the expected origin and the
//! bus HMAC) races a polling loop over the shared result-channel store.
//! Whichever channel observes the outcome first commits it through the
//! registry's compare-and-swap; the loser's late commit collapses to
//! `AlreadyResolved` and is never caller-visible. Both listeners hang off
//! one cancellation token, so the winner tears the other down.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use utoipa::ToSchema;

use crate::error::{WalletError, WalletResult};
use crate::registry::{CorrelationRegistry, RequestOutcome, TransportKind, REQUEST_TTL};
use crate::storage::ChannelStore;

use super::{BusMessage, MessageBus};

/// Fixed interval between storage-channel polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which delivery channels the calling context can actually use. A frame
/// that is cross-origin *and* cannot write the shared store has neither;
/// submitting with neither fails fast instead of hanging forever.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct DeliveryCapabilities {
    /// The frame can receive validated cross-window messages.
    pub message_channel: bool,
    /// The frame can read the shared per-origin store.
    pub storage_channel: bool,
}

impl Default for DeliveryCapabilities {
    fn default() -> Self {
        Self {
            message_channel: true,
            storage_channel: true,
        }
    }
}

/// Adapter for sandboxed cross-origin frames.
pub struct IframeAdapter {
    registry: Arc<CorrelationRegistry>,
    bus: Arc<MessageBus>,
    channel: Arc<ChannelStore>,
    broker_base: Url,
    poll_interval: Duration,
    submit_timeout: Duration,
}

impl IframeAdapter {
    pub fn new(
        registry: Arc<CorrelationRegistry>,
        bus: Arc<MessageBus>,
        channel: Arc<ChannelStore>,
        broker_base: Url,
    ) -> Self {
        Self {
            registry,
            bus,
            channel,
            broker_base,
            poll_interval: POLL_INTERVAL,
            submit_timeout: REQUEST_TTL,
        }
    }

    /// Submit a request from a cross-origin frame and await its resolution.
    pub async fn submit(
        &self,
        method: &str,
        params: serde_json::Value,
        origin: &str,
        return_to: Option<String>,
        capabilities: DeliveryCapabilities,
    ) -> WalletResult<RequestOutcome> {
        if !capabilities.message_channel && !capabilities.storage_channel {
            return Err(WalletError::DeliveryUncertain);
        }

        let (request, decision) =
            self.registry
                .allocate(method, params, origin, TransportKind::Iframe, return_to);

        // Subscribe before announcing intent so no resolution can slip past
        let bus_rx = self.bus.subscribe();

        // Announce intent so the top-level context can navigate to the
        // approval surface on the frame's behalf (best effort)
        let approval_url = super::build_approval_url(&self.broker_base, &request)?;
        self.bus
            .publish_intent(&request.id, origin, approval_url);

        let cancel = CancellationToken::new();
        let mut listeners = Vec::new();

        if capabilities.message_channel {
            listeners.push(tokio::spawn(Self::message_listener(
                self.registry.clone(),
                self.bus.clone(),
                bus_rx,
                request.id.clone(),
                origin.to_string(),
                cancel.child_token(),
            )));
        }
        if capabilities.storage_channel {
            listeners.push(tokio::spawn(Self::storage_poller(
                self.registry.clone(),
                self.channel.clone(),
                request.id.clone(),
                self.poll_interval,
                cancel.child_token(),
            )));
        }

        let result = tokio::time::timeout(self.submit_timeout, decision).await;
        cancel.cancel();
        for listener in listeners {
            let _ = listener.await;
        }

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            _ => {
                let timeout = RequestOutcome::rejected(&WalletError::Timeout);
                match self.registry.resolve(&request.id, timeout.clone()) {
                    Ok(outcome) => Ok(outcome),
                    Err(WalletError::AlreadyResolved) => Ok(self
                        .registry
                        .get(&request.id)
                        .ok()
                        .and_then(|entry| entry.outcome)
                        .unwrap_or(timeout)),
                    Err(_) => Ok(timeout),
                }
            }
        }
    }

    /// Listen for an authenticated resolution message for one request.
    async fn message_listener(
        registry: Arc<CorrelationRegistry>,
        bus: Arc<MessageBus>,
        mut rx: tokio::sync::broadcast::Receiver<BusMessage>,
        request_id: String,
        expected_origin: String,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = rx.recv() => {
                    let message = match received {
                        Ok(message) => message,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    };

                    let BusMessage::Resolution { request_id: rid, origin, outcome, .. } = &message
                    else {
                        continue;
                    };
                    if rid != &request_id {
                        continue;
                    }
                    if !bus.verify(&message) || origin != &expected_origin {
                        // Unexpected sender: discard silently
                        debug!(request_id = %request_id, claimed_origin = %origin,
                            "Discarding resolution from unexpected sender");
                        continue;
                    }

                    // First channel to commit wins; AlreadyResolved means the
                    // other channel (or the broker) beat us
                    let _ = registry.resolve(&request_id, outcome.clone());
                    return;
                }
            }
        }
    }

    /// Poll the shared store for `result_<id>` / `error_<id>` keys.
    async fn storage_poller(
        registry: Arc<CorrelationRegistry>,
        channel: Arc<ChannelStore>,
        request_id: String,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(poll_interval) => {
                    match channel.take(&request_id) {
                        Ok(Some(outcome)) => {
                            let _ = registry.resolve(&request_id, outcome);
                            return;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(request_id = %request_id, error = %e,
                                "Storage channel poll failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn test_adapter() -> (IframeAdapter, std::path::PathBuf) {
        let path = env::temp_dir().join(format!("test-iframe-{}.redb", uuid::Uuid::new_v4()));
        let adapter = IframeAdapter {
            registry: Arc::new(CorrelationRegistry::new()),
            bus: Arc::new(MessageBus::new()),
            channel: Arc::new(ChannelStore::open(&path).unwrap()),
            broker_base: Url::parse("http://localhost:8080/approve").unwrap(),
            poll_interval: Duration::from_millis(25),
            submit_timeout: Duration::from_millis(1500),
        };
        (adapter, path)
    }

    #[tokio::test]
    async fn no_capabilities_fails_fast() {
        let (adapter, path) = test_adapter();
        let err = adapter
            .submit(
                "eth_requestAccounts",
                serde_json::json!([]),
                "https://dapp.example",
                None,
                DeliveryCapabilities {
                    message_channel: false,
                    storage_channel: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::DeliveryUncertain));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn storage_channel_delivers() {
        let (adapter, path) = test_adapter();
        let channel = adapter.channel.clone();
        let bus = adapter.bus.clone();

        // Learn the request id from the intent announcement
        let mut intents = bus.subscribe();
        let submit = tokio::spawn(async move {
            adapter
                .submit(
                    "personal_sign",
                    serde_json::json!(["0xdead", "0xabc"]),
                    "https://dapp.example",
                    None,
                    DeliveryCapabilities {
                        message_channel: false,
                        storage_channel: true,
                    },
                )
                .await
        });

        let request_id = match intents.recv().await.unwrap() {
            BusMessage::Intent { request_id, .. } => request_id,
            other => panic!("expected intent, got {other:?}"),
        };

        channel
            .publish(
                &request_id,
                &RequestOutcome::Approved(serde_json::json!("0xsig")),
            )
            .unwrap();

        let outcome = submit.await.unwrap().unwrap();
        assert_eq!(outcome, RequestOutcome::Approved(serde_json::json!("0xsig")));
        // The key was consumed on first observation
        assert!(channel.take(&request_id).unwrap().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn message_channel_delivers() {
        let (adapter, path) = test_adapter();
        let bus = adapter.bus.clone();

        let mut intents = bus.subscribe();
        let submit = tokio::spawn(async move {
            adapter
                .submit(
                    "eth_requestAccounts",
                    serde_json::json!([]),
                    "https://dapp.example",
                    None,
                    DeliveryCapabilities::default(),
                )
                .await
        });

        let request_id = match intents.recv().await.unwrap() {
            BusMessage::Intent { request_id, .. } => request_id,
            other => panic!("expected intent, got {other:?}"),
        };

        bus.publish_resolution(
            &request_id,
            "https://dapp.example",
            RequestOutcome::Approved(serde_json::json!({"accounts": ["0xabc"]})),
        );

        let outcome = submit.await.unwrap().unwrap();
        assert!(matches!(outcome, RequestOutcome::Approved(_)));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn mismatched_origin_is_discarded_silently() {
        let (adapter, path) = test_adapter();
        let bus = adapter.bus.clone();

        let mut intents = bus.subscribe();
        let submit = tokio::spawn(async move {
            adapter
                .submit(
                    "personal_sign",
                    serde_json::json!(["0xdead", "0xabc"]),
                    "https://dapp.example",
                    None,
                    DeliveryCapabilities {
                        message_channel: true,
                        storage_channel: false,
                    },
                )
                .await
        });

        let request_id = match intents.recv().await.unwrap() {
            BusMessage::Intent { request_id, .. } => request_id,
            other => panic!("expected intent, got {other:?}"),
        };

        // Validly-tagged message, but from the wrong origin: ignored
        bus.publish_resolution(
            &request_id,
            "https://evil.example",
            RequestOutcome::Approved(serde_json::json!("stolen")),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The genuine origin still gets through afterwards
        bus.publish_resolution(
            &request_id,
            "https://dapp.example",
            RequestOutcome::Approved(serde_json::json!("0xsig")),
        );

        let outcome = submit.await.unwrap().unwrap();
        assert_eq!(outcome, RequestOutcome::Approved(serde_json::json!("0xsig")));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn racing_channels_deliver_exactly_once() {
        let (adapter, path) = test_adapter();
        let bus = adapter.bus.clone();
        let channel = adapter.channel.clone();
        let registry = adapter.registry.clone();

        let mut intents = bus.subscribe();
        let submit = tokio::spawn(async move {
            adapter
                .submit(
                    "personal_sign",
                    serde_json::json!(["0xdead", "0xabc"]),
                    "https://dapp.example",
                    None,
                    DeliveryCapabilities::default(),
                )
                .await
        });

        let request_id = match intents.recv().await.unwrap() {
            BusMessage::Intent { request_id, .. } => request_id,
            other => panic!("expected intent, got {other:?}"),
        };

        // Both channels race with the same approval
        let approved = RequestOutcome::Approved(serde_json::json!("0xsig"));
        channel.publish(&request_id, &approved).unwrap();
        bus.publish_resolution(&request_id, "https://dapp.example", approved.clone());

        let outcome = submit.await.unwrap().unwrap();
        assert_eq!(outcome, approved);

        // Exactly one commit happened; the entry is terminal with one outcome
        let entry = registry.get(&request_id).unwrap();
        assert_eq!(entry.outcome, Some(approved));
        assert!(matches!(
            registry.resolve(
                &request_id,
                RequestOutcome::rejected(&WalletError::UserRejected)
            ),
            Err(WalletError::AlreadyResolved)
        ));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn no_decision_times_out_with_structured_rejection() {
        let (adapter, path) = test_adapter();
        let bus = adapter.bus.clone();

        let mut intents = bus.subscribe();
        let submit = tokio::spawn(async move {
            adapter
                .submit(
                    "personal_sign",
                    serde_json::json!(["0xdead", "0xabc"]),
                    "https://dapp.example",
                    None,
                    DeliveryCapabilities::default(),
                )
                .await
        });
        let _ = intents.recv().await.unwrap();

        let outcome = submit.await.unwrap().unwrap();
        match outcome {
            RequestOutcome::Rejected(rejection) => {
                assert_eq!(rejection.code, WalletError::Timeout.provider_code());
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        let _ = std::fs::remove_file(path);
    }
}
