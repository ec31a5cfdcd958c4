// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connected-origin endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::connections::ConnectedDApp;
use crate::error::ApiError;
use crate::state::AppState;

/// List connected dApps.
#[utoipa::path(
    get,
    path = "/v1/connections",
    tag = "Connections",
    responses((status = 200, description = "Connected dApps", body = [ConnectedDApp]))
)]
pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectedDApp>> {
    Json(state.connections.list())
}

/// Disconnect a dApp. Signing-class requests were never exempted by the
/// connection; this only stops silent read-only disclosure.
#[utoipa::path(
    delete,
    path = "/v1/connections/{connection_id}",
    tag = "Connections",
    params(("connection_id" = String, Path, description = "Connection id")),
    responses((status = 200), (status = 404, description = "Unknown connection"))
)]
pub async fn remove_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .connections
        .remove(&connection_id)
        .map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}
