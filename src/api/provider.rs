// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider entry points: where dApp method calls enter the pipeline.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiError, Rejection, WalletError};
use crate::models::{IframeRequestBody, ProviderRequestBody, ProviderResponse, RequestMode};
use crate::provider::{Disposition, WalletMethod};
use crate::registry::PendingRequest;
use crate::state::AppState;

/// Fold an adapter outcome or infrastructure error into the provider
/// response shape: callers always receive a result or a structured
/// rejection, never a transport-layer error.
fn respond(outcome: Result<crate::registry::RequestOutcome, WalletError>) -> ProviderResponse {
    match outcome {
        Ok(outcome) => match outcome.into_result() {
            Ok(value) => ProviderResponse::result(value),
            Err(rejection) => ProviderResponse::error(rejection),
        },
        Err(e) => ProviderResponse::error(Rejection::from(&e)),
    }
}

/// Submit a provider method call from a same-context dApp.
#[utoipa::path(
    post,
    path = "/v1/provider/request",
    request_body = ProviderRequestBody,
    tag = "Provider",
    responses((status = 200, description = "Method result or structured rejection", body = ProviderResponse))
)]
pub async fn submit_request(
    State(state): State<AppState>,
    Json(body): Json<ProviderRequestBody>,
) -> Result<Json<ProviderResponse>, ApiError> {
    let method = WalletMethod::parse(&body.method).map_err(ApiError::from)?;

    match state.provider.dispatch(&method, &body.params, &body.origin).await {
        Ok(Disposition::Immediate(value)) => return Ok(Json(ProviderResponse::result(value))),
        Ok(Disposition::NeedsApproval) => {}
        Err(e) => return Ok(Json(ProviderResponse::error(Rejection::from(&e)))),
    }

    match body.mode {
        Some(RequestMode::Redirect) => {
            let return_url = body.return_url.ok_or_else(|| {
                ApiError::bad_request("redirect mode requires a return_url")
            })?;
            let (request, approval_url) = state
                .same_context
                .begin_redirect(method.name(), body.params, &body.origin, return_url)
                .map_err(ApiError::from)?;
            Ok(Json(ProviderResponse::redirect(
                request.id,
                approval_url.to_string(),
            )))
        }
        _ => {
            let outcome = state
                .same_context
                .submit(method.name(), body.params, &body.origin, body.return_url)
                .await;
            Ok(Json(respond(outcome)))
        }
    }
}

/// Submit a provider method call from a cross-origin iframe.
#[utoipa::path(
    post,
    path = "/v1/provider/iframe",
    request_body = IframeRequestBody,
    tag = "Provider",
    responses((status = 200, description = "Method result or structured rejection", body = ProviderResponse))
)]
pub async fn submit_iframe_request(
    State(state): State<AppState>,
    Json(body): Json<IframeRequestBody>,
) -> Result<Json<ProviderResponse>, ApiError> {
    let method = WalletMethod::parse(&body.method).map_err(ApiError::from)?;

    match state.provider.dispatch(&method, &body.params, &body.origin).await {
        Ok(Disposition::Immediate(value)) => return Ok(Json(ProviderResponse::result(value))),
        Ok(Disposition::NeedsApproval) => {}
        Err(e) => return Ok(Json(ProviderResponse::error(Rejection::from(&e)))),
    }

    let outcome = state
        .iframe
        .submit(
            method.name(),
            body.params,
            &body.origin,
            body.return_url,
            body.capabilities.unwrap_or_default(),
        )
        .await;
    Ok(Json(respond(outcome)))
}

/// Observe a pending request by id (mounted callers and redirect returns).
#[utoipa::path(
    get,
    path = "/v1/provider/requests/{request_id}",
    tag = "Provider",
    params(("request_id" = String, Path, description = "Correlation id")),
    responses(
        (status = 200, description = "Current request state", body = PendingRequest),
        (status = 404, description = "Unknown or already consumed request"),
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<PendingRequest>, ApiError> {
    let request = state.same_context.poll(&request_id).map_err(ApiError::from)?;
    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::env;
    use std::fs;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_state() -> (AppState, std::path::PathBuf) {
        let dir = env::temp_dir().join(format!("test-api-provider-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();
        state.vault.create(KEY, "pw", "Main").unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn unsupported_method_is_bad_request() {
        let (state, dir) = test_state();

        let err = submit_request(
            State(state),
            Json(ProviderRequestBody {
                method: "eth_coinbase".into(),
                params: serde_json::json!([]),
                origin: "https://dapp.example".into(),
                mode: None,
                return_url: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn connected_origin_reads_accounts_silently() {
        let (state, dir) = test_state();
        state
            .connections
            .upsert("https://dapp.example", "Example")
            .unwrap();

        let response = submit_request(
            State(state),
            Json(ProviderRequestBody {
                method: "eth_accounts".into(),
                params: serde_json::json!([]),
                origin: "https://dapp.example".into(),
                mode: None,
                return_url: None,
            }),
        )
        .await
        .unwrap();

        let accounts = response.0.result.unwrap();
        assert_eq!(accounts.as_array().unwrap().len(), 1);
        // No pending request was allocated
        assert!(response.0.request_id.is_none());

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn redirect_mode_returns_approval_url() {
        let (state, dir) = test_state();

        let response = submit_request(
            State(state.clone()),
            Json(ProviderRequestBody {
                method: "eth_requestAccounts".into(),
                params: serde_json::json!([]),
                origin: "https://dapp.example".into(),
                mode: Some(RequestMode::Redirect),
                return_url: Some("https://dapp.example/return".into()),
            }),
        )
        .await
        .unwrap();

        let request_id = response.0.request_id.unwrap();
        let approval_url = response.0.approval_url.unwrap();
        assert!(approval_url.contains(&format!("requestId={request_id}")));

        // The request is observable while pending
        let observed = get_request(State(state), Path(request_id)).await.unwrap();
        assert_eq!(observed.0.method, "eth_requestAccounts");

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn redirect_mode_without_return_url_is_rejected() {
        let (state, dir) = test_state();

        let err = submit_request(
            State(state),
            Json(ProviderRequestBody {
                method: "eth_requestAccounts".into(),
                params: serde_json::json!([]),
                origin: "https://dapp.example".into(),
                mode: Some(RequestMode::Redirect),
                return_url: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn chain_switch_answers_immediately() {
        let (state, dir) = test_state();

        state
            .chains
            .add(crate::chains::ChainInfo {
                chain_id: "0x89".into(),
                name: "Polygon".into(),
                rpc_url: None,
            })
            .unwrap();

        let response = submit_request(
            State(state.clone()),
            Json(ProviderRequestBody {
                method: "wallet_switchEthereumChain".into(),
                params: serde_json::json!([{"chainId": "0x89"}]),
                origin: "https://dapp.example".into(),
                mode: None,
                return_url: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.result, Some(serde_json::Value::Null));
        assert_eq!(state.chains.active_chain_id(), "0x89");

        let _ = fs::remove_dir_all(dir);
    }
}
