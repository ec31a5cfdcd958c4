// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Notification Sink
//!
//! Outbound notification boundary. Terminal decisions are posted to a
//! configured webhook, fire-and-forget: a sink failure never affects the
//! pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// A terminal-decision notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionNotice {
    /// Correlation id (registry uuid or relay numeric id as string).
    pub request_id: String,
    /// Wallet method that was decided.
    pub method: String,
    /// Origin of the requesting dApp.
    pub origin: String,
    /// Whether the request was approved.
    pub approved: bool,
    /// Decision time.
    pub decided_at: DateTime<Utc>,
}

/// Outbound notification sink.
pub enum NotificationSink {
    /// POST each notice to a webhook endpoint.
    Webhook {
        http: reqwest::Client,
        endpoint: Url,
    },
    /// No sink configured.
    Disabled,
}

impl NotificationSink {
    /// Build a sink from optional configuration.
    pub fn from_endpoint(endpoint: Option<Url>) -> Self {
        match endpoint {
            Some(endpoint) => Self::Webhook {
                http: reqwest::Client::new(),
                endpoint,
            },
            None => Self::Disabled,
        }
    }

    /// Deliver a notice. Best effort; failures are logged and dropped.
    pub async fn notify(&self, notice: DecisionNotice) {
        match self {
            NotificationSink::Webhook { http, endpoint } => {
                let result = http.post(endpoint.clone()).json(&notice).send().await;
                match result.and_then(|r| r.error_for_status()) {
                    Ok(_) => {
                        debug!(request_id = %notice.request_id, "Decision notice delivered")
                    }
                    Err(e) => {
                        warn!(request_id = %notice.request_id, error = %e,
                            "Decision notice delivery failed")
                    }
                }
            }
            NotificationSink::Disabled => {}
        }
    }
}
