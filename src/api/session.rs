// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session handoff endpoints: identity bootstrap for contexts with no
//! established wallet session. These sit in front of the approval pipeline
//! and are never consulted for approval decisions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ApiError;
use crate::models::{
    ConnectSessionRequest, ConnectSessionResponse, RegisterRequest, SessionStatusResponse,
};
use crate::state::AppState;

/// Register a user's wallet address.
#[utoipa::path(
    post,
    path = "/v1/session/register",
    request_body = RegisterRequest,
    tag = "Session",
    responses((status = 200, description = "Registered"))
)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> StatusCode {
    state.handoffs.register_user(&body.user_id, &body.address);
    StatusCode::OK
}

/// Start a connect flow, issuing a 24-hour handoff token.
#[utoipa::path(
    post,
    path = "/v1/session/connect",
    request_body = ConnectSessionRequest,
    tag = "Session",
    responses((status = 200, description = "Where to navigate next", body = ConnectSessionResponse))
)]
pub async fn connect(
    State(state): State<AppState>,
    Json(body): Json<ConnectSessionRequest>,
) -> Result<Json<ConnectSessionResponse>, ApiError> {
    let user_id = body.user_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let record = state.handoffs.issue(&user_id, &body.return_url);

    // Send the caller to the wallet's connect surface carrying the token
    let mut redirect_url = state.config.approval_base_url.clone();
    redirect_url.set_path("/connect");
    redirect_url.set_query(None);
    redirect_url
        .query_pairs_mut()
        .append_pair("token", &record.token)
        .append_pair("return", &body.return_url);

    Ok(Json(ConnectSessionResponse {
        redirect_url: redirect_url.to_string(),
        session_token: Some(record.token),
    }))
}

/// Identity status for a user.
#[utoipa::path(
    get,
    path = "/v1/session/status/{user_id}",
    tag = "Session",
    params(("user_id" = String, Path, description = "User id")),
    responses((status = 200, description = "Identity status", body = SessionStatusResponse))
)]
pub async fn status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<SessionStatusResponse> {
    let address = state.handoffs.user_address(&user_id);
    Json(SessionStatusResponse {
        exists: address.is_some(),
        has_wallet: state.vault.status().wallet_count > 0,
        address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::env;
    use std::fs;

    fn test_state() -> (AppState, std::path::PathBuf) {
        let dir = env::temp_dir().join(format!("test-api-session-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn connect_issues_token_and_redirect() {
        let (state, dir) = test_state();

        let response = connect(
            State(state.clone()),
            Json(ConnectSessionRequest {
                user_id: None,
                return_url: "https://dapp.example/return".into(),
            }),
        )
        .await
        .unwrap();

        let token = response.0.session_token.unwrap();
        assert!(response.0.redirect_url.contains(&format!("token={token}")));

        // The token resolves until redeemed
        let record = state.handoffs.get(&token).unwrap();
        assert_eq!(record.return_url, "https://dapp.example/return");

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn status_reflects_registration_and_vault() {
        let (state, dir) = test_state();

        let before = status(State(state.clone()), Path("user-1".into())).await;
        assert!(!before.0.exists);
        assert!(!before.0.has_wallet);

        register(
            State(state.clone()),
            Json(RegisterRequest {
                user_id: "user-1".into(),
                address: "0xABC0000000000000000000000000000000000001".into(),
            }),
        )
        .await;

        let after = status(State(state), Path("user-1".into())).await;
        assert!(after.0.exists);
        assert_eq!(
            after.0.address.as_deref(),
            Some("0xabc0000000000000000000000000000000000001")
        );

        let _ = fs::remove_dir_all(dir);
    }
}
