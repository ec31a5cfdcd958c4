// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared result-channel store backed by redb (pure Rust, ACID).
//!
//! This is the storage half of the iframe adapter's dual delivery channel.
//! The approval side writes `result_<requestId>` / `error_<requestId>` keys;
//! the polling side consumes them with at-most-once semantics (both keys are
//! deleted in the same transaction as the first observation).
//!
//! ## Table Layout
//!
//! - `channel`: key (`result_<id>` | `error_<id>`) → JSON bytes

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Rejection;
use crate::registry::RequestOutcome;

/// Channel table: `result_<id>` / `error_<id>` → JSON payload bytes.
const CHANNEL: TableDefinition<&str, &[u8]> = TableDefinition::new("channel");

#[derive(Debug, thiserror::Error)]
pub enum ChannelDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ChannelDbResult<T> = Result<T, ChannelDbError>;

fn result_key(request_id: &str) -> String {
    format!("result_{request_id}")
}

fn error_key(request_id: &str) -> String {
    format!("error_{request_id}")
}

/// Shared per-origin result store for cross-context delivery.
pub struct ChannelStore {
    db: Database,
}

impl ChannelStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> ChannelDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Ensure the table exists so first reads don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CHANNEL)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Publish a terminal outcome under the wire-contract key for its kind.
    pub fn publish(&self, request_id: &str, outcome: &RequestOutcome) -> ChannelDbResult<()> {
        let (key, bytes) = match outcome {
            RequestOutcome::Approved(value) => (result_key(request_id), serde_json::to_vec(value)?),
            RequestOutcome::Rejected(rejection) => {
                (error_key(request_id), serde_json::to_vec(rejection)?)
            }
        };

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CHANNEL)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Check whether either key is present, without consuming.
    pub fn peek(&self, request_id: &str) -> ChannelDbResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHANNEL)?;
        let present = table.get(result_key(request_id).as_str())?.is_some()
            || table.get(error_key(request_id).as_str())?.is_some();
        Ok(present)
    }

    /// Consume the outcome for a request, if any.
    ///
    /// Both keys are removed in the same transaction as the observation, so
    /// a racing second reader sees nothing (at-most-once read).
    pub fn take(&self, request_id: &str) -> ChannelDbResult<Option<RequestOutcome>> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(CHANNEL)?;
            let result_bytes = table
                .remove(result_key(request_id).as_str())?
                .map(|guard| guard.value().to_vec());
            let error_bytes = table
                .remove(error_key(request_id).as_str())?
                .map(|guard| guard.value().to_vec());

            if let Some(bytes) = result_bytes {
                Some(RequestOutcome::Approved(serde_json::from_slice(&bytes)?))
            } else if let Some(bytes) = error_bytes {
                let rejection: Rejection = serde_json::from_slice(&bytes)?;
                Some(RequestOutcome::Rejected(rejection))
            } else {
                None
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn test_db() -> (ChannelStore, std::path::PathBuf) {
        let path = env::temp_dir().join(format!("test-channel-{}.redb", uuid::Uuid::new_v4()));
        (ChannelStore::open(&path).unwrap(), path)
    }

    #[test]
    fn publish_and_take_result() {
        let (store, path) = test_db();

        let value = serde_json::json!({"accounts": ["0xabc"]});
        store
            .publish("req-1", &RequestOutcome::Approved(value.clone()))
            .unwrap();

        assert!(store.peek("req-1").unwrap());
        let outcome = store.take("req-1").unwrap();
        assert_eq!(outcome, Some(RequestOutcome::Approved(value)));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn take_is_at_most_once() {
        let (store, path) = test_db();

        store
            .publish("req-2", &RequestOutcome::Approved(serde_json::json!(true)))
            .unwrap();

        assert!(store.take("req-2").unwrap().is_some());
        // Second observation sees nothing
        assert!(store.take("req-2").unwrap().is_none());
        assert!(!store.peek("req-2").unwrap());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rejection_round_trips_through_error_key() {
        let (store, path) = test_db();

        let rejection = Rejection {
            code: 4001,
            message: "user rejected the request".into(),
        };
        store
            .publish("req-3", &RequestOutcome::Rejected(rejection))
            .unwrap();

        match store.take("req-3").unwrap() {
            Some(RequestOutcome::Rejected(r)) => assert_eq!(r.code, 4001),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn take_removes_both_keys() {
        let (store, path) = test_db();

        store
            .publish("req-4", &RequestOutcome::Approved(serde_json::json!("ok")))
            .unwrap();
        store
            .publish(
                "req-4",
                &RequestOutcome::Rejected(Rejection {
                    code: -32000,
                    message: "request timed out".into(),
                }),
            )
            .unwrap();

        // Result wins; both keys are gone afterwards
        assert!(matches!(
            store.take("req-4").unwrap(),
            Some(RequestOutcome::Approved(_))
        ));
        assert!(store.take("req-4").unwrap().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn take_missing_returns_none() {
        let (store, path) = test_db();
        assert!(store.take("missing").unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }
}
