// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::models::HealthResponse;
use crate::state::AppState;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::env;
    use std::fs;

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = env::temp_dir().join(format!("test-api-health-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();

        let response = health(State(state)).await;
        assert_eq!(response.0.status, "ok");

        let _ = fs::remove_dir_all(dir);
    }
}
