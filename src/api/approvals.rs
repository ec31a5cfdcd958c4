// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Approval surface endpoints: read a pending request, commit a decision.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::broker::DecisionOutcome;
use crate::error::ApiError;
use crate::models::DecisionRequestBody;
use crate::registry::PendingRequest;
use crate::state::AppState;

/// Read a pending request for presentation.
///
/// Returns 423 while the vault is locked; the UI must authenticate first.
#[utoipa::path(
    get,
    path = "/v1/approvals/{request_id}",
    tag = "Approvals",
    params(("request_id" = String, Path, description = "Correlation id")),
    responses(
        (status = 200, description = "The pending request", body = PendingRequest),
        (status = 404, description = "Unknown or already consumed request"),
        (status = 423, description = "Vault is locked"),
    )
)]
pub async fn get_approval(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<PendingRequest>, ApiError> {
    let request = state.broker.view(&request_id).map_err(ApiError::from)?;
    Ok(Json(request))
}

/// Commit a decision for a pending request.
#[utoipa::path(
    post,
    path = "/v1/approvals/{request_id}/decision",
    request_body = DecisionRequestBody,
    tag = "Approvals",
    params(("request_id" = String, Path, description = "Correlation id")),
    responses(
        (status = 200, description = "The committed decision", body = DecisionOutcome),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Already resolved"),
        (status = 423, description = "Vault is locked"),
    )
)]
pub async fn post_decision(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<DecisionRequestBody>,
) -> Result<Json<DecisionOutcome>, ApiError> {
    let outcome = state
        .broker
        .decide(&request_id, body.approve, body.wallet_id.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(outcome))
}
