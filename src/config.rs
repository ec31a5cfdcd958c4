// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the startup configuration
//! loader.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for persistent storage | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `APPROVAL_BASE_URL` | Approval surface the adapters navigate to | `http://localhost:8080/approve` |
//! | `RELAY_BRIDGE_URL` | Relay bridge endpoint for the pairing protocol | Unset (relay disabled) |
//! | `NOTIFY_WEBHOOK_URL` | Webhook for terminal-decision notices | Unset (disabled) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

use url::Url;

use crate::storage::paths::DATA_ROOT;

/// Environment variable name for the persistent data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the bind host.
pub const HOST_ENV: &str = "HOST";

/// Environment variable name for the bind port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the approval surface base URL.
///
/// This is the URL transport adapters encode requests into (§ wire contract:
/// `method`, `params`, `requestId`, `origin`, `return` query params).
pub const APPROVAL_BASE_URL_ENV: &str = "APPROVAL_BASE_URL";

/// Environment variable name for the relay bridge endpoint.
pub const RELAY_BRIDGE_URL_ENV: &str = "RELAY_BRIDGE_URL";

/// Environment variable name for the decision-notice webhook.
pub const NOTIFY_WEBHOOK_URL_ENV: &str = "NOTIFY_WEBHOOK_URL";

/// Environment variable name for the log format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default approval surface when none is configured.
const DEFAULT_APPROVAL_BASE_URL: &str = "http://localhost:8080/approve";

/// Startup configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub approval_base_url: Url,
    pub relay_bridge_url: Option<Url>,
    pub notify_webhook_url: Option<Url>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_ROOT),
            host: "0.0.0.0".to_string(),
            port: 8080,
            approval_base_url: Url::parse(DEFAULT_APPROVAL_BASE_URL)
                .expect("default approval url parses"),
            relay_bridge_url: None,
            notify_webhook_url: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the environment, falling back to defaults on
    /// missing or malformed values.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let parse_url = |var: &str| {
            std::env::var(var)
                .ok()
                .and_then(|raw| Url::parse(&raw).ok())
        };

        Self {
            data_dir: std::env::var(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: std::env::var(HOST_ENV).unwrap_or(defaults.host),
            port: std::env::var(PORT_ENV)
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            approval_base_url: parse_url(APPROVAL_BASE_URL_ENV)
                .unwrap_or(defaults.approval_base_url),
            relay_bridge_url: parse_url(RELAY_BRIDGE_URL_ENV),
            notify_webhook_url: parse_url(NOTIFY_WEBHOOK_URL_ENV),
        }
    }
}
