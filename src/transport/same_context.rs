// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Same-context adapter: caller and approval surface share an origin.
//!
//! Two delivery paths:
//! - the caller stays mounted and awaits the decision in place (the only
//!   synchronous, non-polling fast path in the system), or
//! - the caller navigates away and the decision comes back encoded on the
//!   return URL (`wallet_result` + `wallet_status`). A full page navigation
//!   discards in-memory state, so the return URL is treated as a message:
//!   the outcome is reconstructed purely from it plus a registry lookup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{WalletError, WalletResult};
use crate::registry::{
    CorrelationRegistry, DecisionReceiver, PendingRequest, RequestOutcome, TransportKind,
    REQUEST_TTL,
};

/// Extra slack past the registry deadline before the adapter gives up on the
/// waiter locally.
const DECISION_GRACE: Duration = Duration::from_secs(5);

/// Result payload appended to the return URL on decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedirectResult {
    /// Whether the request was approved.
    pub approved: bool,
    /// Accounts disclosed by the decision (empty for sign-class requests).
    pub accounts: Vec<String>,
    /// Active hex chain id at decision time.
    #[serde(rename = "chainId")]
    pub chain_id: String,
    /// Unix timestamp of the decision.
    pub timestamp: i64,
}

/// Adapter for callers sharing the approval surface's origin.
pub struct SameContextAdapter {
    registry: Arc<CorrelationRegistry>,
    broker_base: Url,
}

impl SameContextAdapter {
    pub fn new(registry: Arc<CorrelationRegistry>, broker_base: Url) -> Self {
        Self {
            registry,
            broker_base,
        }
    }

    /// Allocate a request and build its approval URL.
    pub fn begin(
        &self,
        method: &str,
        params: serde_json::Value,
        origin: &str,
        return_to: Option<String>,
    ) -> WalletResult<(PendingRequest, DecisionReceiver, Url)> {
        let (request, decision) = self.registry.allocate(
            method,
            params,
            origin,
            TransportKind::SameContext,
            return_to,
        );
        let approval_url = super::build_approval_url(&self.broker_base, &request)?;
        debug!(request_id = %request.id, url = %approval_url, "Approval surface ready");
        Ok((request, decision, approval_url))
    }

    /// Await the decision for a request begun with [`begin`](Self::begin).
    pub async fn wait(
        &self,
        request: &PendingRequest,
        decision: DecisionReceiver,
    ) -> WalletResult<RequestOutcome> {
        match tokio::time::timeout(REQUEST_TTL + DECISION_GRACE, decision).await {
            Ok(Ok(outcome)) => Ok(outcome),
            // Waiter lost or deadline passed: commit the timeout ourselves so
            // a late decision is cleanly refused, then report it
            _ => {
                let timeout = RequestOutcome::rejected(&WalletError::Timeout);
                match self.registry.resolve(&request.id, timeout.clone()) {
                    Ok(outcome) => Ok(outcome),
                    Err(WalletError::AlreadyResolved) => {
                        // A decision landed in the race window; surface it
                        Ok(self
                            .registry
                            .get(&request.id)
                            .ok()
                            .and_then(|entry| entry.outcome)
                            .unwrap_or(timeout))
                    }
                    Err(_) => Ok(timeout),
                }
            }
        }
    }

    /// Submit a request and await the decision in place.
    pub async fn submit(
        &self,
        method: &str,
        params: serde_json::Value,
        origin: &str,
        return_to: Option<String>,
    ) -> WalletResult<RequestOutcome> {
        let (request, decision, _approval_url) = self.begin(method, params, origin, return_to)?;
        self.wait(&request, decision).await
    }

    /// Begin a redirect flow: allocate the request and hand back the
    /// approval URL for navigation. The result returns via the return URL.
    pub fn begin_redirect(
        &self,
        method: &str,
        params: serde_json::Value,
        origin: &str,
        return_to: String,
    ) -> WalletResult<(PendingRequest, Url)> {
        let (request, _decision, approval_url) =
            self.begin(method, params, origin, Some(return_to))?;
        Ok((request, approval_url))
    }

    /// Registry lookup for a mounted caller observing its request.
    pub fn poll(&self, request_id: &str) -> WalletResult<PendingRequest> {
        self.registry.get(request_id)
    }
}

/// Append the decision to a return URL per the redirect-result contract.
pub fn append_redirect_result(return_to: &str, result: &RedirectResult) -> WalletResult<Url> {
    let mut url = Url::parse(return_to)
        .map_err(|e| WalletError::InvalidInput(format!("bad return url: {e}")))?;
    let payload = serde_json::to_string(result)
        .map_err(|e| WalletError::InvalidInput(format!("unencodable result: {e}")))?;

    let status = if result.approved { "approved" } else { "rejected" };
    url.query_pairs_mut()
        .append_pair("wallet_result", &payload)
        .append_pair("wallet_status", status);
    Ok(url)
}

/// Reconstruct a decision from a return URL, if one is encoded there.
pub fn decode_redirect_result(url: &Url) -> WalletResult<Option<RedirectResult>> {
    let mut payload = None;
    let mut status = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "wallet_result" => payload = Some(value.into_owned()),
            "wallet_status" => status = Some(value.into_owned()),
            _ => {}
        }
    }

    let Some(payload) = payload else {
        return Ok(None);
    };
    let result: RedirectResult = serde_json::from_str(&payload)
        .map_err(|e| WalletError::InvalidInput(format!("bad wallet_result payload: {e}")))?;

    // The redundant status flag must agree with the payload
    if let Some(status) = status {
        let expected = if result.approved { "approved" } else { "rejected" };
        if status != expected {
            return Err(WalletError::InvalidInput(
                "wallet_status disagrees with wallet_result".into(),
            ));
        }
    }
    Ok(Some(result))
}

/// Build the redirect payload for a terminal outcome.
pub fn redirect_result_for(
    outcome: &RequestOutcome,
    accounts: Vec<String>,
    chain_id: String,
) -> RedirectResult {
    RedirectResult {
        approved: matches!(outcome, RequestOutcome::Approved(_)),
        accounts,
        chain_id,
        timestamp: Utc::now().timestamp(),
    }
}
