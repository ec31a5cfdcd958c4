// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transport Adapters
//!
//! Three ways a provider request reaches the approval surface and its result
//! travels back, polymorphic over one capability: deliver a request, receive
//! a resolution.
//!
//! - [`same_context`]: direct await plus redirect-with-result-in-URL.
//! - [`iframe`]: authenticated message channel raced against a shared
//!   storage channel, for sandboxed cross-origin callers.
//! - [`relay`]: persistent session client for the external pairing
//!   protocol.
//!
//! All adapters share the approval-URL wire contract (query params `method`,
//! `params`, `requestId`, `origin`, `return`) and the cross-context message
//! bus defined here.

pub mod iframe;
pub mod relay;
pub mod same_context;

use base64ct::Encoding as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::broadcast;
use url::Url;

use crate::error::{WalletError, WalletResult};
use crate::registry::{PendingRequest, RequestOutcome};

type HmacSha256 = Hmac<Sha256>;

/// Capacity of the in-process message bus.
const BUS_CAPACITY: usize = 64;

/// Build the approval-surface URL for a pending request.
///
/// This is the wire contract between adapters and the approval UI: params
/// are JSON-stringified and percent-encoded into the query string.
pub fn build_approval_url(broker_base: &Url, request: &PendingRequest) -> WalletResult<Url> {
    let mut url = broker_base.clone();
    let params_json = serde_json::to_string(&request.params)
        .map_err(|e| WalletError::InvalidInput(format!("unencodable params: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("method", &request.method);
        query.append_pair("params", &params_json);
        query.append_pair("requestId", &request.id);
        query.append_pair("origin", &request.origin);
        if let Some(return_to) = &request.return_to {
            query.append_pair("return", return_to);
        }
    }
    Ok(url)
}

/// A message on the cross-context bus. Every message carries an HMAC tag so
/// receivers can drop forgeries without trusting the sender's origin claim.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// Subframe → top level: an approval surface should be opened.
    Intent {
        request_id: String,
        origin: String,
        approval_url: Url,
        tag: String,
    },
    /// Approval side → caller: a terminal outcome for a request.
    Resolution {
        request_id: String,
        origin: String,
        outcome: RequestOutcome,
        tag: String,
    },
}

impl BusMessage {
    fn kind(&self) -> &'static str {
        match self {
            BusMessage::Intent { .. } => "intent",
            BusMessage::Resolution { .. } => "resolution",
        }
    }

    fn request_id(&self) -> &str {
        match self {
            BusMessage::Intent { request_id, .. } => request_id,
            BusMessage::Resolution { request_id, .. } => request_id,
        }
    }

    fn origin(&self) -> &str {
        match self {
            BusMessage::Intent { origin, .. } => origin,
            BusMessage::Resolution { origin, .. } => origin,
        }
    }

    fn tag(&self) -> &str {
        match self {
            BusMessage::Intent { tag, .. } => tag,
            BusMessage::Resolution { tag, .. } => tag,
        }
    }
}

/// In-process cross-context message bus with per-message authentication.
///
/// The key is generated per process; messages from before a restart (or from
/// a forger) fail verification and are discarded silently.
pub struct MessageBus {
    tx: broadcast::Sender<BusMessage>,
    key: [u8; 32],
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        use rand::RngCore;
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { tx, key }
    }

    /// Compute the authentication tag for a message of `kind` about
    /// `request_id` from `origin`.
    pub fn sign(&self, kind: &str, request_id: &str, origin: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(kind.as_bytes());
        mac.update(b"|");
        mac.update(request_id.as_bytes());
        mac.update(b"|");
        mac.update(origin.as_bytes());
        let digest = mac.finalize().into_bytes();
        base64ct::Base64::encode_string(&digest)
    }

    /// Verify a message's tag against its claimed fields.
    pub fn verify(&self, message: &BusMessage) -> bool {
        let expected = self.sign(message.kind(), message.request_id(), message.origin());
        // Tags are HMAC outputs; plain comparison does not leak the key
        expected == message.tag()
    }

    /// Publish a message. Returns how many receivers observed it.
    pub fn publish(&self, message: BusMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    /// Subscribe to the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Publish an authenticated resolution for a request.
    pub fn publish_resolution(&self, request_id: &str, origin: &str, outcome: RequestOutcome) {
        let tag = self.sign("resolution", request_id, origin);
        self.publish(BusMessage::Resolution {
            request_id: request_id.to_string(),
            origin: origin.to_string(),
            outcome,
            tag,
        });
    }

    /// Publish an authenticated intent announcement.
    pub fn publish_intent(&self, request_id: &str, origin: &str, approval_url: Url) {
        let tag = self.sign("intent", request_id, origin);
        self.publish(BusMessage::Intent {
            request_id: request_id.to_string(),
            origin: origin.to_string(),
            approval_url,
            tag,
        });
    }
}
