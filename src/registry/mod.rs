// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Correlation Registry
//!
//! Single source of truth for in-flight provider requests. Transport
//! adapters allocate entries here, the approval broker resolves them, and
//! whichever delivery channel commits first wins: `resolve` is a
//! compare-and-swap on `Pending`, so duplicate deliveries (double clicks,
//! racing channels, late relay callbacks) collapse to `AlreadyResolved`
//! without re-triggering user-visible effects.
//!
//! Entries past their fixed 300-second deadline become `Expired`, which a
//! waiting caller observes as a `Timeout` rejection. Delivered entries are
//! garbage-collected into an LRU tombstone cache so a late resolve still
//! answers `AlreadyResolved` rather than `NotFound`.

pub mod sweeper;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Rejection, WalletError, WalletResult};

/// Fixed decision deadline for signing/connection requests. Not configurable
/// per call.
pub const REQUEST_TTL: Duration = Duration::from_secs(300);

/// How long a terminal entry stays readable before it is tombstoned.
const TERMINAL_GRACE: Duration = Duration::from_secs(60);

/// Capacity of the tombstone cache of delivered request ids.
const TOMBSTONE_CAPACITY: usize = 1024;

/// Lifecycle state of a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// Which transport adapter owns delivery for a request.
///
/// Relay requests are not listed here: they arrive with their own numeric
/// ids and are tracked by the relay hub, not this registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    SameContext,
    Iframe,
}

/// Terminal outcome of a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestOutcome {
    /// The method result delivered to the caller.
    Approved(serde_json::Value),
    /// A structured rejection delivered to the caller.
    Rejected(Rejection),
}

impl RequestOutcome {
    /// Build the rejection outcome for a domain error.
    pub fn rejected(err: &WalletError) -> Self {
        Self::Rejected(Rejection::from(err))
    }

    /// Convert into the caller-facing result.
    pub fn into_result(self) -> Result<serde_json::Value, Rejection> {
        match self {
            RequestOutcome::Approved(value) => Ok(value),
            RequestOutcome::Rejected(rejection) => Err(rejection),
        }
    }
}

/// An in-flight (or recently terminal) provider request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingRequest {
    /// Opaque, unguessable correlation id.
    pub id: String,
    /// Wallet method name (e.g. `personal_sign`).
    pub method: String,
    /// Method params as supplied by the caller.
    pub params: serde_json::Value,
    /// Origin claimed by the calling context.
    pub origin: String,
    /// Adapter that owns delivery.
    pub transport: TransportKind,
    /// Return pointer for redirect flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    /// When the request was allocated.
    pub created_at: DateTime<Utc>,
    /// Fixed decision deadline.
    pub deadline: DateTime<Utc>,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// Terminal outcome, present once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RequestOutcome>,
    /// When the request reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Receives the terminal outcome exactly once.
pub type DecisionReceiver = oneshot::Receiver<RequestOutcome>;

struct RegistryInner {
    requests: HashMap<String, PendingRequest>,
    waiters: HashMap<String, oneshot::Sender<RequestOutcome>>,
    tombstones: LruCache<String, RequestStatus>,
}

/// Tracker mapping opaque request ids to in-flight/terminal state.
pub struct CorrelationRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                requests: HashMap::new(),
                waiters: HashMap::new(),
                tombstones: LruCache::new(
                    NonZeroUsize::new(TOMBSTONE_CAPACITY).expect("nonzero capacity"),
                ),
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a new pending request and its decision receiver.
    ///
    /// The receiver fires exactly once with the terminal outcome. A caller
    /// that stops awaiting does not retract the entry; the sweeper expires
    /// it at the deadline.
    pub fn allocate(
        &self,
        method: &str,
        params: serde_json::Value,
        origin: &str,
        transport: TransportKind,
        return_to: Option<String>,
    ) -> (PendingRequest, DecisionReceiver) {
        let now = Utc::now();
        let request = PendingRequest {
            id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
            origin: origin.to_string(),
            transport,
            return_to,
            created_at: now,
            deadline: now
                + chrono::Duration::from_std(REQUEST_TTL).expect("ttl fits chrono range"),
            status: RequestStatus::Pending,
            outcome: None,
            resolved_at: None,
        };

        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock_inner();
        inner.waiters.insert(request.id.clone(), tx);
        inner.requests.insert(request.id.clone(), request.clone());

        tracing::debug!(
            request_id = %request.id,
            method = %request.method,
            origin = %request.origin,
            transport = ?request.transport,
            "Request allocated"
        );
        (request, rx)
    }

    /// Transition an entry past its deadline to `Expired`, notifying the
    /// waiter with a `Timeout` rejection. Caller must hold the lock.
    fn expire_entry(inner: &mut RegistryInner, id: &str, now: DateTime<Utc>) {
        if let Some(entry) = inner.requests.get_mut(id) {
            if entry.status == RequestStatus::Pending && now > entry.deadline {
                let outcome = RequestOutcome::rejected(&WalletError::Timeout);
                entry.status = RequestStatus::Expired;
                entry.outcome = Some(outcome.clone());
                entry.resolved_at = Some(now);
                if let Some(tx) = inner.waiters.remove(id) {
                    let _ = tx.send(outcome);
                }
                tracing::info!(request_id = %id, "Request expired without a decision");
            }
        }
    }

    /// Look up a request by id, applying lazy expiry.
    ///
    /// Lookup is the only read path; no enumeration is exposed.
    pub fn get(&self, id: &str) -> WalletResult<PendingRequest> {
        let mut inner = self.lock_inner();
        Self::expire_entry(&mut inner, id, Utc::now());
        inner
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(format!("request {id}")))
    }

    /// Commit a terminal outcome for a pending request.
    ///
    /// Compare-and-swap: only a `Pending` entry transitions. Any other state
    /// (or a tombstoned id) fails with `AlreadyResolved` and mutates
    /// nothing; an unknown id fails with `NotFound`.
    pub fn resolve(&self, id: &str, outcome: RequestOutcome) -> WalletResult<RequestOutcome> {
        let mut inner = self.lock_inner();
        let now = Utc::now();
        Self::expire_entry(&mut inner, id, now);

        match inner.requests.get_mut(id) {
            Some(entry) => {
                if entry.status != RequestStatus::Pending {
                    return Err(WalletError::AlreadyResolved);
                }
                let new_status = match outcome {
                    RequestOutcome::Approved(_) => RequestStatus::Approved,
                    RequestOutcome::Rejected(_) => RequestStatus::Rejected,
                };
                entry.status = new_status;
                entry.outcome = Some(outcome.clone());
                entry.resolved_at = Some(now);

                if let Some(tx) = inner.waiters.remove(id) {
                    // A dropped receiver just means the caller went away
                    let _ = tx.send(outcome.clone());
                }

                tracing::info!(request_id = %id, status = ?new_status, "Request resolved");
                Ok(outcome)
            }
            None => {
                if inner.tombstones.contains(id) {
                    Err(WalletError::AlreadyResolved)
                } else {
                    Err(WalletError::NotFound(format!("request {id}")))
                }
            }
        }
    }

    /// Expire all overdue pending entries. Returns how many transitioned.
    pub fn expire_overdue(&self) -> usize {
        let mut inner = self.lock_inner();
        let now = Utc::now();
        let overdue: Vec<String> = inner
            .requests
            .iter()
            .filter(|(_, e)| e.status == RequestStatus::Pending && now > e.deadline)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &overdue {
            Self::expire_entry(&mut inner, id, now);
        }
        overdue.len()
    }

    /// Garbage-collect terminal entries past the grace window into the
    /// tombstone cache. Returns how many were collected.
    pub fn gc_terminal(&self) -> usize {
        let mut inner = self.lock_inner();
        let now = Utc::now();
        let grace = chrono::Duration::from_std(TERMINAL_GRACE).expect("grace fits chrono range");

        let done: Vec<(String, RequestStatus)> = inner
            .requests
            .iter()
            .filter(|(_, e)| {
                e.status != RequestStatus::Pending
                    && e.resolved_at.is_some_and(|at| now - at > grace)
            })
            .map(|(id, e)| (id.clone(), e.status))
            .collect();

        for (id, status) in &done {
            inner.requests.remove(id);
            inner.waiters.remove(id);
            inner.tombstones.put(id.clone(), *status);
        }
        done.len()
    }

    /// Number of live (pending or grace-period) entries. Broker-side only.
    pub fn len(&self) -> usize {
        self.lock_inner().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocate(registry: &CorrelationRegistry) -> (PendingRequest, DecisionReceiver) {
        registry.allocate(
            "personal_sign",
            serde_json::json!(["0xdeadbeef", "0xabc"]),
            "https://dapp.example",
            TransportKind::SameContext,
            None,
        )
    }

    #[test]
    fn allocate_sets_fixed_deadline() {
        let registry = CorrelationRegistry::new();
        let (request, _rx) = allocate(&registry);

        assert_eq!(request.status, RequestStatus::Pending);
        let ttl = (request.deadline - request.created_at).num_seconds();
        assert_eq!(ttl, 300);
    }

    #[test]
    fn ids_are_unique() {
        let registry = CorrelationRegistry::new();
        let (a, _rxa) = allocate(&registry);
        let (b, _rxb) = allocate(&registry);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn resolve_succeeds_at_most_once() {
        let registry = CorrelationRegistry::new();
        let (request, rx) = allocate(&registry);

        let outcome = RequestOutcome::Approved(serde_json::json!("0xsig"));
        registry.resolve(&request.id, outcome.clone()).unwrap();

        // Second resolution fails and leaves the first result unchanged
        let err = registry
            .resolve(&request.id, RequestOutcome::rejected(&WalletError::UserRejected))
            .unwrap_err();
        assert!(matches!(err, WalletError::AlreadyResolved));

        assert_eq!(rx.await.unwrap(), outcome);
        let entry = registry.get(&request.id).unwrap();
        assert_eq!(entry.status, RequestStatus::Approved);
        assert_eq!(entry.outcome, Some(outcome));
    }

    #[test]
    fn resolve_unknown_id_is_not_found() {
        let registry = CorrelationRegistry::new();
        let err = registry
            .resolve("nope", RequestOutcome::Approved(serde_json::json!(null)))
            .unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
    }

    #[tokio::test]
    async fn overdue_entry_expires_as_timeout() {
        let registry = CorrelationRegistry::new();
        let (request, rx) = allocate(&registry);

        // Force the deadline into the past
        {
            let mut inner = registry.lock_inner();
            inner.requests.get_mut(&request.id).unwrap().deadline =
                Utc::now() - chrono::Duration::seconds(1);
        }

        assert_eq!(registry.expire_overdue(), 1);

        match rx.await.unwrap() {
            RequestOutcome::Rejected(rejection) => {
                assert_eq!(rejection.code, WalletError::Timeout.provider_code());
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        // A late decision is AlreadyResolved
        let err = registry
            .resolve(&request.id, RequestOutcome::Approved(serde_json::json!(true)))
            .unwrap_err();
        assert!(matches!(err, WalletError::AlreadyResolved));
    }

    #[test]
    fn lazy_expiry_applies_on_lookup() {
        let registry = CorrelationRegistry::new();
        let (request, _rx) = allocate(&registry);

        {
            let mut inner = registry.lock_inner();
            inner.requests.get_mut(&request.id).unwrap().deadline =
                Utc::now() - chrono::Duration::seconds(1);
        }

        let entry = registry.get(&request.id).unwrap();
        assert_eq!(entry.status, RequestStatus::Expired);
    }

    #[test]
    fn gc_moves_terminal_entries_to_tombstones() {
        let registry = CorrelationRegistry::new();
        let (request, _rx) = allocate(&registry);
        registry
            .resolve(&request.id, RequestOutcome::Approved(serde_json::json!(true)))
            .unwrap();

        // Age the resolution past the grace window
        {
            let mut inner = registry.lock_inner();
            inner.requests.get_mut(&request.id).unwrap().resolved_at =
                Some(Utc::now() - chrono::Duration::seconds(120));
        }

        assert_eq!(registry.gc_terminal(), 1);
        assert!(registry.is_empty());

        // Tombstone still answers AlreadyResolved, while lookup is NotFound
        let err = registry
            .resolve(&request.id, RequestOutcome::Approved(serde_json::json!(false)))
            .unwrap_err();
        assert!(matches!(err, WalletError::AlreadyResolved));
        assert!(matches!(
            registry.get(&request.id),
            Err(WalletError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_break_resolution() {
        let registry = CorrelationRegistry::new();
        let (request, rx) = allocate(&registry);
        drop(rx);

        // Cancel-safe: resolving after the caller went away still commits
        registry
            .resolve(&request.id, RequestOutcome::Approved(serde_json::json!(1)))
            .unwrap();
        assert_eq!(
            registry.get(&request.id).unwrap().status,
            RequestStatus::Approved
        );
    }
}
