// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the gateway.
//!
//! [`WalletError`] is the domain-level taxonomy shared by the vault, the
//! correlation registry, the transport adapters, and the approval broker.
//! [`ApiError`] is the HTTP-facing shape; [`Rejection`] is the provider-facing
//! `{code, message}` shape delivered to dApp callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Domain errors for vault, registry, transport, and broker operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Password verification failed. Wrong password and corrupt key material
    /// surface identically to callers.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// An operation would violate a vault invariant (e.g. deleting the
    /// primary wallet).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Unknown request, proposal, wallet, or chain id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A second resolution was attempted on a terminal request.
    #[error("request already resolved")]
    AlreadyResolved,

    /// The request deadline elapsed with no decision.
    #[error("request timed out")]
    Timeout,

    /// The user explicitly declined the request.
    #[error("user rejected the request")]
    UserRejected,

    /// A channel message arrived from an unexpected sender. Discarded at the
    /// channel layer; callers never observe this directly.
    #[error("message origin mismatch")]
    OriginMismatch,

    /// The vault is locked; the operation requires re-authentication first.
    #[error("vault is locked")]
    VaultLocked,

    /// Malformed key material, mnemonic, params, or URL.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Neither delivery channel of the iframe adapter is usable for this
    /// request, so a resolution could never arrive.
    #[error("no delivery channel available for the request")]
    DeliveryUncertain,

    /// Persistent storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StoreError),

    /// Result-channel store failure.
    #[error("channel store error: {0}")]
    Channel(#[from] crate::storage::ChannelDbError),

    /// Relay socket or session failure.
    #[error("relay error: {0}")]
    Relay(String),

    /// Upstream RPC boundary failure.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl WalletError {
    /// Provider-facing rejection code (EIP-1193-shaped).
    pub fn provider_code(&self) -> i64 {
        match self {
            WalletError::UserRejected => 4001,
            WalletError::VaultLocked | WalletError::AuthenticationFailed => -32002,
            WalletError::Timeout => -32000,
            WalletError::NotFound(_) | WalletError::AlreadyResolved => -32001,
            WalletError::InvalidInput(_) => -32602,
            WalletError::InvariantViolation(_)
            | WalletError::OriginMismatch
            | WalletError::DeliveryUncertain
            | WalletError::Storage(_)
            | WalletError::Channel(_)
            | WalletError::Relay(_)
            | WalletError::Rpc(_) => -32603,
        }
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

/// Structured rejection delivered to dApp callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Rejection {
    /// EIP-1193-shaped error code.
    pub code: i64,
    /// Human-readable reason.
    pub message: String,
}

impl From<&WalletError> for Rejection {
    fn from(err: &WalletError) -> Self {
        Self {
            code: err.provider_code(),
            message: err.to_string(),
        }
    }
}

/// HTTP-facing error with status code and JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        let status = match &err {
            WalletError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            WalletError::VaultLocked => StatusCode::LOCKED,
            WalletError::NotFound(_) => StatusCode::NOT_FOUND,
            WalletError::AlreadyResolved => StatusCode::CONFLICT,
            WalletError::Timeout => StatusCode::REQUEST_TIMEOUT,
            WalletError::UserRejected => StatusCode::CONFLICT,
            WalletError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WalletError::OriginMismatch => StatusCode::FORBIDDEN,
            WalletError::DeliveryUncertain
            | WalletError::Storage(_)
            | WalletError::Channel(_)
            | WalletError::Relay(_)
            | WalletError::Rpc(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn provider_codes_match_taxonomy() {
        assert_eq!(WalletError::UserRejected.provider_code(), 4001);
        assert_eq!(WalletError::VaultLocked.provider_code(), -32002);
        assert_eq!(WalletError::Timeout.provider_code(), -32000);
        assert_eq!(
            WalletError::InvalidInput("bad params".into()).provider_code(),
            -32602
        );
    }

    #[test]
    fn rejection_carries_code_and_message() {
        let rejection = Rejection::from(&WalletError::UserRejected);
        assert_eq!(rejection.code, 4001);
        assert_eq!(rejection.message, "user rejected the request");
    }

    #[test]
    fn wallet_error_maps_to_status() {
        let err: ApiError = WalletError::VaultLocked.into();
        assert_eq!(err.status, StatusCode::LOCKED);

        let err: ApiError = WalletError::NotFound("request abc".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = WalletError::AlreadyResolved.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
