// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    broker::DecisionOutcome,
    chains::ChainInfo,
    connections::ConnectedDApp,
    error::Rejection,
    models::{
        AutoLockRequest, ChangePasswordRequest, ConnectSessionRequest, ConnectSessionResponse,
        CreateWalletRequest, DecisionRequestBody, HealthResponse, IframeRequestBody,
        ProviderRequestBody, ProviderResponse, RegisterRequest, RelayDecisionBody, RequestMode,
        SessionStatusResponse, UnlockRequest,
    },
    registry::{PendingRequest, RequestOutcome, RequestStatus, TransportKind},
    state::AppState,
    transport::iframe::DeliveryCapabilities,
    transport::relay::{RelayEvent, StoredRelayEvent},
    vault::{VaultStatus, WalletSummary},
};

pub mod approvals;
pub mod connections;
pub mod health;
pub mod provider;
pub mod relay;
pub mod session;
pub mod vault;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/provider/request", post(provider::submit_request))
        .route("/provider/iframe", post(provider::submit_iframe_request))
        .route("/provider/requests/{request_id}", get(provider::get_request))
        .route("/approvals/{request_id}", get(approvals::get_approval))
        .route(
            "/approvals/{request_id}/decision",
            post(approvals::post_decision),
        )
        .route("/relay/events", post(relay::ingest_event))
        .route("/relay/proposals/{event_id}", get(relay::get_proposal))
        .route(
            "/relay/proposals/{event_id}/decision",
            post(relay::decide_proposal),
        )
        .route("/relay/requests/{event_id}", get(relay::get_request))
        .route(
            "/relay/requests/{event_id}/decision",
            post(relay::decide_request),
        )
        .route(
            "/vault/wallets",
            get(vault::list_wallets).post(vault::create_wallet),
        )
        .route("/vault/wallets/{wallet_id}", delete(vault::delete_wallet))
        .route("/vault/active/{wallet_id}", put(vault::set_active_wallet))
        .route("/vault/unlock", post(vault::unlock))
        .route("/vault/lock", post(vault::lock))
        .route("/vault/entry", post(vault::entry_reload))
        .route("/vault/password", put(vault::change_password))
        .route("/vault/autolock", put(vault::set_autolock))
        .route("/vault/status", get(vault::status))
        .route("/connections", get(connections::list_connections))
        .route(
            "/connections/{connection_id}",
            delete(connections::remove_connection),
        )
        .route("/session/register", post(session::register))
        .route("/session/connect", post(session::connect))
        .route("/session/status/{user_id}", get(session::status))
        .route("/health", get(health::health))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        provider::submit_request,
        provider::submit_iframe_request,
        provider::get_request,
        approvals::get_approval,
        approvals::post_decision,
        relay::ingest_event,
        relay::get_proposal,
        relay::decide_proposal,
        relay::get_request,
        relay::decide_request,
        vault::create_wallet,
        vault::list_wallets,
        vault::delete_wallet,
        vault::set_active_wallet,
        vault::unlock,
        vault::lock,
        vault::entry_reload,
        vault::change_password,
        vault::set_autolock,
        vault::status,
        connections::list_connections,
        connections::remove_connection,
        session::register,
        session::connect,
        session::status,
        health::health
    ),
    components(
        schemas(
            ProviderRequestBody,
            IframeRequestBody,
            ProviderResponse,
            RequestMode,
            DeliveryCapabilities,
            Rejection,
            PendingRequest,
            RequestOutcome,
            RequestStatus,
            TransportKind,
            DecisionRequestBody,
            DecisionOutcome,
            RelayEvent,
            StoredRelayEvent,
            RelayDecisionBody,
            CreateWalletRequest,
            UnlockRequest,
            ChangePasswordRequest,
            AutoLockRequest,
            WalletSummary,
            VaultStatus,
            ConnectedDApp,
            ChainInfo,
            RegisterRequest,
            ConnectSessionRequest,
            ConnectSessionResponse,
            SessionStatusResponse,
            HealthResponse
        )
    ),
    tags(
        (name = "Provider", description = "dApp-facing wallet provider surface"),
        (name = "Approvals", description = "Human approval surface"),
        (name = "Relay", description = "External pairing protocol"),
        (name = "Vault", description = "Key vault and lock state"),
        (name = "Connections", description = "Connected dApp origins"),
        (name = "Session", description = "Identity handoff bootstrap"),
        (name = "Health", description = "Probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::env;
    use std::fs;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let dir = env::temp_dir().join(format!("test-router-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();

        let app = router(state);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();

        let _ = fs::remove_dir_all(dir);
    }
}
