// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response structures for the REST surface. All types derive
//! `Serialize`/`Deserialize` and `ToSchema` for JSON handling and OpenAPI
//! documentation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Rejection;
use crate::transport::iframe::DeliveryCapabilities;

fn default_params() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

// =============================================================================
// Provider Entry
// =============================================================================

/// How a same-context call wants its result delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Hold the HTTP call open until the decision lands (or times out).
    Await,
    /// Return the approval URL immediately; the result comes back encoded
    /// on the return URL.
    Redirect,
}

/// A provider method call from a dApp context.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderRequestBody {
    /// Wallet method name (e.g. `eth_requestAccounts`).
    pub method: String,
    /// Method params; defaults to `[]`.
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
    /// Origin claimed by the calling context.
    pub origin: String,
    /// Delivery mode; defaults to `await`.
    #[serde(default)]
    pub mode: Option<RequestMode>,
    /// Return URL for redirect mode.
    #[serde(default)]
    pub return_url: Option<String>,
}

/// A provider method call from a cross-origin iframe.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IframeRequestBody {
    /// Wallet method name.
    pub method: String,
    /// Method params; defaults to `[]`.
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
    /// Origin claimed by the frame.
    pub origin: String,
    /// Return pointer for the best-effort top-level navigation.
    #[serde(default)]
    pub return_url: Option<String>,
    /// Which delivery channels the frame can use.
    #[serde(default)]
    pub capabilities: Option<DeliveryCapabilities>,
}

/// Provider call response: exactly one of `result` / `error`, or the
/// redirect fields when the call entered a redirect flow.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderResponse {
    /// Method result on approval or immediate answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Structured rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Rejection>,
    /// Correlation id, present for pipeline calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Approval surface URL, present in redirect mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
}

impl ProviderResponse {
    pub fn result(value: serde_json::Value) -> Self {
        Self {
            result: Some(value),
            error: None,
            request_id: None,
            approval_url: None,
        }
    }

    pub fn error(rejection: Rejection) -> Self {
        Self {
            result: None,
            error: Some(rejection),
            request_id: None,
            approval_url: None,
        }
    }

    pub fn redirect(request_id: String, approval_url: String) -> Self {
        Self {
            result: None,
            error: None,
            request_id: Some(request_id),
            approval_url: Some(approval_url),
        }
    }
}

// =============================================================================
// Approval Surface
// =============================================================================

/// A decision submitted from the approval surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionRequestBody {
    /// Accept or decline the entire request; no partial edits.
    pub approve: bool,
    /// Which wallet services the request; defaults to the active wallet.
    #[serde(default)]
    pub wallet_id: Option<String>,
}

// =============================================================================
// Vault
// =============================================================================

/// Create a wallet from key material.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    /// Hex private key or BIP-39 mnemonic.
    pub material: String,
    /// Vault password (set by the first wallet, verified afterwards).
    pub password: String,
    /// Display name.
    #[serde(default = "default_wallet_name")]
    pub name: String,
}

fn default_wallet_name() -> String {
    "Wallet".to_string()
}

/// Unlock the vault.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnlockRequest {
    pub password: String,
}

/// Rotate the vault password.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Configure the auto-lock threshold.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AutoLockRequest {
    /// Idle seconds before auto-lock; 0 disables.
    pub seconds: u64,
}

// =============================================================================
// Session Handoff
// =============================================================================

/// Register a user's wallet address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub user_id: String,
    pub address: String,
}

/// Start a connect flow from a context with no established identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectSessionRequest {
    /// Known user id, when re-connecting.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Where to send the context after identity is established.
    pub return_url: String,
}

/// Connect flow bootstrap response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectSessionResponse {
    /// Where the caller should navigate next.
    pub redirect_url: String,
    /// Handoff token, present when a new session was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// Identity status for a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionStatusResponse {
    /// Whether the user id is known.
    pub exists: bool,
    /// Whether the vault holds any wallet.
    pub has_wallet: bool,
    /// Registered address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// =============================================================================
// Relay
// =============================================================================

/// A decision on a relay proposal or request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayDecisionBody {
    pub approve: bool,
    #[serde(default)]
    pub wallet_id: Option<String>,
}

// =============================================================================
// Health
// =============================================================================

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults_params() {
        let body: ProviderRequestBody = serde_json::from_str(
            r#"{"method": "eth_accounts", "origin": "https://dapp.example"}"#,
        )
        .unwrap();
        assert_eq!(body.params, serde_json::json!([]));
        assert!(body.mode.is_none());
    }

    #[test]
    fn provider_response_serializes_only_set_fields() {
        let response = ProviderResponse::result(serde_json::json!(["0xabc"]));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"result":["0xabc"]}"#);

        let response = ProviderResponse::error(Rejection {
            code: 4001,
            message: "user rejected the request".into(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], 4001);
    }

    #[test]
    fn create_wallet_defaults_name() {
        let body: CreateWalletRequest =
            serde_json::from_str(r#"{"material": "0xabc", "password": "pw"}"#).unwrap();
        assert_eq!(body.name, "Wallet");
    }
}
