// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay endpoints: event ingestion and proposal/request decisions.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiError, WalletError};
use crate::models::RelayDecisionBody;
use crate::state::AppState;
use crate::transport::relay::{RelayEvent, StoredRelayEvent};

/// Ingest an inbound relay event.
///
/// Events are persisted by numeric id before any UI involvement, so the
/// approval surface can retrieve them after a cold load. Replays of an
/// already-persisted id are idempotent.
#[utoipa::path(
    post,
    path = "/v1/relay/events",
    request_body = RelayEvent,
    tag = "Relay",
    responses((status = 200, description = "The persisted event", body = StoredRelayEvent))
)]
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<RelayEvent>,
) -> Result<Json<StoredRelayEvent>, ApiError> {
    // Touch the singleton client so initialization happens ahead of the
    // first decision; safe to invoke redundantly
    let _ = state.relay.client().await;

    let stored = state.relay.ingest(event).map_err(ApiError::from)?;
    Ok(Json(stored))
}

/// Retrieve a persisted session proposal.
#[utoipa::path(
    get,
    path = "/v1/relay/proposals/{event_id}",
    tag = "Relay",
    params(("event_id" = u64, Path, description = "Numeric event id")),
    responses(
        (status = 200, description = "The proposal", body = StoredRelayEvent),
        (status = 404, description = "Unknown event or not a proposal"),
    )
)]
pub async fn get_proposal(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
) -> Result<Json<StoredRelayEvent>, ApiError> {
    let stored = state.relay.event(event_id).map_err(ApiError::from)?;
    if !matches!(stored.event, RelayEvent::SessionProposal { .. }) {
        return Err(WalletError::NotFound(format!("relay proposal {event_id}")).into());
    }
    Ok(Json(stored))
}

/// Decide a session proposal.
#[utoipa::path(
    post,
    path = "/v1/relay/proposals/{event_id}/decision",
    request_body = RelayDecisionBody,
    tag = "Relay",
    params(("event_id" = u64, Path, description = "Numeric event id")),
    responses(
        (status = 200, description = "Namespace grant (approve) or null (reject)"),
        (status = 404, description = "Unknown proposal"),
        (status = 409, description = "Already decided"),
        (status = 423, description = "Vault is locked"),
    )
)]
pub async fn decide_proposal(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
    Json(body): Json<RelayDecisionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let grant = state
        .broker
        .decide_relay_proposal(event_id, body.approve, body.wallet_id.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(grant))
}

/// Retrieve a persisted session request.
#[utoipa::path(
    get,
    path = "/v1/relay/requests/{event_id}",
    tag = "Relay",
    params(("event_id" = u64, Path, description = "Numeric event id")),
    responses(
        (status = 200, description = "The request", body = StoredRelayEvent),
        (status = 404, description = "Unknown event or not a request"),
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
) -> Result<Json<StoredRelayEvent>, ApiError> {
    let stored = state.relay.event(event_id).map_err(ApiError::from)?;
    if !matches!(stored.event, RelayEvent::SessionRequest { .. }) {
        return Err(WalletError::NotFound(format!("relay request {event_id}")).into());
    }
    Ok(Json(stored))
}

/// Decide a session request. The answer travels back over the session
/// topic as a JSON-RPC-shaped result or error.
#[utoipa::path(
    post,
    path = "/v1/relay/requests/{event_id}/decision",
    request_body = RelayDecisionBody,
    tag = "Relay",
    params(("event_id" = u64, Path, description = "Numeric event id")),
    responses(
        (status = 200, description = "The JSON-RPC-shaped response sent over the session"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Already decided"),
        (status = 423, description = "Vault is locked"),
    )
)]
pub async fn decide_request(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
    Json(body): Json<RelayDecisionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let response = state
        .broker
        .decide_relay_request(event_id, body.approve, body.wallet_id.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::env;
    use std::fs;

    fn test_state() -> (AppState, std::path::PathBuf) {
        let dir = env::temp_dir().join(format!("test-api-relay-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();
        (state, dir)
    }

    fn proposal(id: u64) -> RelayEvent {
        RelayEvent::SessionProposal {
            id,
            topic: format!("topic-{id}"),
            proposer_name: "Example dApp".into(),
            proposer_url: "https://dapp.example".into(),
            chains: vec![],
            methods: vec![],
            events: vec![],
        }
    }

    #[tokio::test]
    async fn ingest_then_retrieve_by_id() {
        let (state, dir) = test_state();

        ingest_event(State(state.clone()), Json(proposal(1)))
            .await
            .unwrap();

        let stored = get_proposal(State(state.clone()), Path(1)).await.unwrap();
        assert!(!stored.0.consumed);

        // The same id is not retrievable as a request
        let err = get_request(State(state), Path(1)).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn locked_vault_blocks_relay_decisions() {
        let (state, dir) = test_state();
        ingest_event(State(state.clone()), Json(proposal(2)))
            .await
            .unwrap();
        // No wallet was created; the vault is locked
        assert!(state.vault.is_locked());

        let err = decide_proposal(
            State(state),
            Path(2),
            Json(RelayDecisionBody {
                approve: true,
                wallet_id: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::LOCKED);

        let _ = fs::remove_dir_all(dir);
    }
}
