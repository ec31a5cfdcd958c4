// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON record storage with atomic writes.
//!
//! Records are plain JSON files; anything secret inside them (private keys,
//! mnemonics) is sealed by the vault cipher before it reaches this layer, so
//! the files themselves carry no plaintext key material.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entity not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Storage not initialized
    #[error("storage not initialized")]
    NotInitialized,
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// JSON record store rooted at the gateway data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    paths: super::StoragePaths,
    initialized: bool,
}

impl JsonStore {
    /// Create a new JsonStore.
    ///
    /// Does NOT create the directory structure. Call `initialize()` first.
    pub fn new(paths: super::StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &super::StoragePaths {
        &self.paths
    }

    /// Initialize the directory structure.
    ///
    /// Safe to call multiple times (idempotent).
    pub fn initialize(&mut self) -> StoreResult<()> {
        let dirs = [
            self.paths.wallets_dir(),
            self.paths.connections_dir(),
            self.paths.relay_dir(),
        ];

        for dir in dirs {
            fs::create_dir_all(&dir)?;
        }

        self.initialized = true;
        Ok(())
    }

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StoreResult<T> {
        if !self.initialized {
            return Err(StoreError::NotInitialized);
        }

        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let value = serde_json::from_reader(reader)?;
        Ok(value)
    }

    /// Write a JSON file (atomic write via rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StoreResult<()> {
        if !self.initialized {
            return Err(StoreError::NotInitialized);
        }

        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Check if a file exists.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    /// Delete a file.
    pub fn delete(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        if !self.initialized {
            return Err(StoreError::NotInitialized);
        }
        fs::remove_file(path.as_ref())?;
        Ok(())
    }

    /// List the ids (file stems) of all records in a directory.
    pub fn list_ids(&self, dir: impl AsRef<Path>) -> StoreResult<Vec<String>> {
        if !self.initialized {
            return Err(StoreError::NotInitialized);
        }

        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use serde::{Deserialize, Serialize};
    use std::env;

    fn test_store() -> JsonStore {
        let test_dir = env::temp_dir().join(format!("test-store-{}", uuid::Uuid::new_v4()));
        let mut store = JsonStore::new(StoragePaths::new(&test_dir));
        store.initialize().expect("Failed to initialize test store");
        store
    }

    fn cleanup(store: &JsonStore) {
        let _ = fs::remove_dir_all(store.paths().root());
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: String,
        value: i32,
    }

    #[test]
    fn initialize_creates_directories() {
        let store = test_store();

        assert!(store.paths().wallets_dir().exists());
        assert!(store.paths().connections_dir().exists());
        assert!(store.paths().relay_dir().exists());

        cleanup(&store);
    }

    #[test]
    fn write_and_read_json() {
        let store = test_store();
        let data = TestData {
            id: "test-1".to_string(),
            value: 42,
        };

        let path = store.paths().wallet("test-1");
        store.write_json(&path, &data).unwrap();

        let read: TestData = store.read_json(&path).unwrap();
        assert_eq!(read, data);

        cleanup(&store);
    }

    #[test]
    fn list_ids_returns_stems() {
        let store = test_store();

        for i in 1..=3 {
            let path = store.paths().connection(&format!("conn-{i}"));
            store
                .write_json(&path, &TestData {
                    id: format!("conn-{i}"),
                    value: i,
                })
                .unwrap();
        }

        let ids = store.list_ids(store.paths().connections_dir()).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"conn-1".to_string()));

        cleanup(&store);
    }

    #[test]
    fn delete_removes_file() {
        let store = test_store();

        let path = store.paths().wallet("to-delete");
        store
            .write_json(&path, &TestData {
                id: "del".to_string(),
                value: 0,
            })
            .unwrap();

        assert!(store.exists(&path));
        store.delete(&path).unwrap();
        assert!(!store.exists(&path));

        cleanup(&store);
    }

    #[test]
    fn uninitialized_store_returns_error() {
        let store = JsonStore::new(StoragePaths::new("/tmp/never-init"));

        let result = store.read_json::<TestData>("/tmp/any.json");
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }
}
