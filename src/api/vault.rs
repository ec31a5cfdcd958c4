// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault endpoints: wallet lifecycle, lock state machine, settings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ApiError;
use crate::models::{AutoLockRequest, ChangePasswordRequest, CreateWalletRequest, UnlockRequest};
use crate::state::AppState;
use crate::vault::{VaultStatus, WalletSummary};

/// Create a wallet from a hex private key or BIP-39 mnemonic.
#[utoipa::path(
    post,
    path = "/v1/vault/wallets",
    request_body = CreateWalletRequest,
    tag = "Vault",
    responses(
        (status = 200, description = "The created wallet", body = WalletSummary),
        (status = 400, description = "Malformed key material"),
        (status = 401, description = "Password does not match the vault"),
    )
)]
pub async fn create_wallet(
    State(state): State<AppState>,
    Json(body): Json<CreateWalletRequest>,
) -> Result<Json<WalletSummary>, ApiError> {
    let summary = state
        .vault
        .create(&body.material, &body.password, &body.name)
        .map_err(ApiError::from)?;
    Ok(Json(summary))
}

/// List wallets.
#[utoipa::path(
    get,
    path = "/v1/vault/wallets",
    tag = "Vault",
    responses((status = 200, description = "All wallets", body = [WalletSummary]))
)]
pub async fn list_wallets(State(state): State<AppState>) -> Json<Vec<WalletSummary>> {
    Json(state.vault.wallets())
}

/// Delete a wallet. The primary and last remaining wallet are protected.
#[utoipa::path(
    delete,
    path = "/v1/vault/wallets/{wallet_id}",
    tag = "Vault",
    params(("wallet_id" = String, Path, description = "Wallet id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Unknown wallet"),
        (status = 422, description = "Primary or last wallet"),
    )
)]
pub async fn delete_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.vault.delete(&wallet_id).map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

/// Make a wallet the active one.
#[utoipa::path(
    put,
    path = "/v1/vault/active/{wallet_id}",
    tag = "Vault",
    params(("wallet_id" = String, Path, description = "Wallet id")),
    responses((status = 200), (status = 404, description = "Unknown wallet"))
)]
pub async fn set_active_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.vault.set_active(&wallet_id).map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

/// Unlock the vault.
#[utoipa::path(
    post,
    path = "/v1/vault/unlock",
    request_body = UnlockRequest,
    tag = "Vault",
    responses(
        (status = 200, description = "Unlocked", body = VaultStatus),
        (status = 401, description = "Authentication failed"),
    )
)]
pub async fn unlock(
    State(state): State<AppState>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<VaultStatus>, ApiError> {
    state.vault.unlock(&body.password).map_err(ApiError::from)?;
    Ok(Json(state.vault.status()))
}

/// Lock the vault. Idempotent.
#[utoipa::path(
    post,
    path = "/v1/vault/lock",
    tag = "Vault",
    responses((status = 200, description = "Locked", body = VaultStatus))
)]
pub async fn lock(State(state): State<AppState>) -> Json<VaultStatus> {
    state.vault.lock();
    Json(state.vault.status())
}

/// Entry-point reload notification from the authenticated view.
///
/// A fresh load is untrusted until re-authenticated, so the vault locks
/// unconditionally regardless of the idle timer.
#[utoipa::path(
    post,
    path = "/v1/vault/entry",
    tag = "Vault",
    responses((status = 200, description = "Locked", body = VaultStatus))
)]
pub async fn entry_reload(State(state): State<AppState>) -> Json<VaultStatus> {
    state.vault.lock_on_entry();
    Json(state.vault.status())
}

/// Rotate the vault password (re-encrypts every wallet, all-or-nothing).
#[utoipa::path(
    put,
    path = "/v1/vault/password",
    request_body = ChangePasswordRequest,
    tag = "Vault",
    responses(
        (status = 200, description = "Password changed"),
        (status = 401, description = "Current password verification failed"),
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .vault
        .change_password(&body.current_password, &body.new_password)
        .map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

/// Configure the auto-lock threshold.
#[utoipa::path(
    put,
    path = "/v1/vault/autolock",
    request_body = AutoLockRequest,
    tag = "Vault",
    responses((status = 200, description = "Updated", body = VaultStatus))
)]
pub async fn set_autolock(
    State(state): State<AppState>,
    Json(body): Json<AutoLockRequest>,
) -> Result<Json<VaultStatus>, ApiError> {
    state
        .vault
        .set_auto_lock_seconds(body.seconds)
        .map_err(ApiError::from)?;
    Ok(Json(state.vault.status()))
}

/// Current vault status.
#[utoipa::path(
    get,
    path = "/v1/vault/status",
    tag = "Vault",
    responses((status = 200, description = "Vault status", body = VaultStatus))
)]
pub async fn status(State(state): State<AppState>) -> Json<VaultStatus> {
    Json(state.vault.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::env;
    use std::fs;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_state() -> (AppState, std::path::PathBuf) {
        let dir = env::temp_dir().join(format!("test-api-vault-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(GatewayConfig {
            data_dir: dir.clone(),
            ..GatewayConfig::default()
        })
        .unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn create_unlock_lock_round_trip() {
        let (state, dir) = test_state();

        let wallet = create_wallet(
            State(state.clone()),
            Json(CreateWalletRequest {
                material: KEY.into(),
                password: "pw".into(),
                name: "Main".into(),
            }),
        )
        .await
        .unwrap();
        assert!(wallet.0.primary);

        let locked = lock(State(state.clone())).await;
        assert!(locked.0.is_locked);

        let err = unlock(
            State(state.clone()),
            Json(UnlockRequest {
                password: "wrong".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let unlocked = unlock(
            State(state),
            Json(UnlockRequest {
                password: "pw".into(),
            }),
        )
        .await
        .unwrap();
        assert!(!unlocked.0.is_locked);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn entry_reload_always_locks() {
        let (state, dir) = test_state();
        create_wallet(
            State(state.clone()),
            Json(CreateWalletRequest {
                material: KEY.into(),
                password: "pw".into(),
                name: "Main".into(),
            }),
        )
        .await
        .unwrap();
        assert!(!state.vault.is_locked());

        let status = entry_reload(State(state)).await;
        assert!(status.0.is_locked);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn delete_primary_is_unprocessable() {
        let (state, dir) = test_state();
        let wallet = create_wallet(
            State(state.clone()),
            Json(CreateWalletRequest {
                material: KEY.into(),
                password: "pw".into(),
                name: "Main".into(),
            }),
        )
        .await
        .unwrap();

        let err = delete_wallet(State(state), Path(wallet.0.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        let _ = fs::remove_dir_all(dir);
    }
}
