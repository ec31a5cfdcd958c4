// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wallet_gateway::api::router;
use wallet_gateway::config::{GatewayConfig, LOG_FORMAT_ENV};
use wallet_gateway::registry::sweeper::ExpirySweeper;
use wallet_gateway::state::AppState;
use wallet_gateway::vault::autolock::AutoLockWatchdog;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    if std::env::var(LOG_FORMAT_ENV).as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = GatewayConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let state = AppState::initialize(config).expect("Failed to initialize application state");

    // Background tasks share one shutdown token
    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(state.registry.clone());
    tokio::spawn(sweeper.run(shutdown.clone()));
    let watchdog = AutoLockWatchdog::new(state.vault.clone());
    tokio::spawn(watchdog.run(shutdown.clone()));

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(addr = %addr, "Wallet gateway listening (docs at /docs)");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .expect("Server failed");

    info!("Wallet gateway stopped");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
