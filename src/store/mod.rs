//! Record Store
//!
//! Generic persisted tables over a single serialized JSON document.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ RecordStore::transaction(f)
//!              │  lock (one writer at a time)
//!              │  load blob ──▶ Document
//!              │  f(&mut Document)
//!              │  Ok  ──▶ save blob (only if dirty)
//!              └  Err ──▶ drop Document, blob untouched
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Whole-document writes**: a transaction commits all of its row changes
//!    in one blob write, or none of them.
//! 2. **Serialized writers**: the store lock is held across load → save, so
//!    in-process callers never lose each other's updates.
//! 3. **Cross-process**: last writer wins on the blob. Run one process per file.

pub mod backend;
pub mod document;
pub mod error;

pub use backend::{BlobBackend, FileBackend, MemoryBackend};
pub use document::{Document, Entity, Lookup, Record, Table};
pub use error::StoreError;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Persisted table store
pub struct RecordStore {
    backend: Arc<dyn BlobBackend>,
    lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    /// Store backed by a JSON file at `path`
    pub fn open_file(path: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(FileBackend::new(path)))
    }

    /// Ephemeral store, nothing leaves the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn load_document(&self) -> Result<Document, StoreError> {
        match self.backend.load().await? {
            Some(blob) if !blob.trim().is_empty() => {
                serde_json::from_str(&blob).map_err(|e| {
                    error!(backend = self.backend.name(), "Persisted document unreadable: {}", e);
                    StoreError::Corrupt(e)
                })
            }
            _ => Ok(Document::default()),
        }
    }

    /// Run `f` against a consistent snapshot without writing
    pub async fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let doc = self.load_document().await?;
        Ok(f(&doc))
    }

    /// Run `f` as one all-or-nothing unit
    ///
    /// The document is written back only when `f` returns `Ok` and changed
    /// something. On `Err` the persisted blob is left exactly as it was.
    pub async fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().await;
        let mut doc = self.load_document().await?;

        let value = f(&mut doc)?;

        if doc.is_dirty() {
            let blob = serde_json::to_string(&doc).map_err(StoreError::from)?;
            self.backend.save(&blob).await?;
            debug!(backend = self.backend.name(), bytes = blob.len(), "Document committed");
        }
        Ok(value)
    }

    // ============================================================
    // SINGLE-OPERATION CONVENIENCE (each is one transaction)
    // ============================================================

    /// All rows of `table`; empty when the table was never written
    pub async fn list_all(&self, table: Table) -> Result<Vec<Record>, StoreError> {
        self.read(|doc| doc.list_all(table).to_vec()).await
    }

    pub async fn get_one(
        &self,
        table: Table,
        lookup: Lookup<'_>,
    ) -> Result<Option<Record>, StoreError> {
        self.read(|doc| doc.get_one(table, lookup).cloned()).await
    }

    pub async fn insert(&self, table: Table, fields: Record) -> Result<Record, StoreError> {
        self.transaction(|doc| Ok(doc.insert(table, fields))).await
    }

    pub async fn update(&self, table: Table, id: &str, patch: Record) -> Result<Record, StoreError> {
        self.transaction(|doc| doc.update(table, id, patch)).await
    }

    pub async fn remove(&self, table: Table, id: &str) -> Result<bool, StoreError> {
        self.transaction(|doc| Ok(doc.remove(table, id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fields must be an object"),
        }
    }

    fn memory_store() -> (RecordStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (RecordStore::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_insert_persists_and_reloads() {
        let (store, backend) = memory_store();
        let stored = store
            .insert(Table::Users, fields(json!({"username": "alice", "role": "customer"})))
            .await
            .unwrap();

        let blob = backend.contents().unwrap();
        assert!(blob.contains("alice"));

        let id = stored["id"].as_str().unwrap();
        let fetched = store.get_one(Table::Users, Lookup::Id(id)).await.unwrap();
        assert_eq!(fetched, Some(stored));
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_blob_untouched() {
        let (store, backend) = memory_store();
        store
            .insert(Table::Chips, fields(json!({"user_id": "u1", "balance": 5})))
            .await
            .unwrap();
        let before = backend.contents();

        let result: Result<(), StoreError> = store
            .transaction(|doc| {
                doc.insert(Table::Chips, fields(json!({"user_id": "u2", "balance": 1})));
                Err(StoreError::NotFound {
                    table: Table::Chips,
                    id: "x".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(backend.contents(), before);
        assert_eq!(store.list_all(Table::Chips).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_transaction_does_not_write() {
        let (store, backend) = memory_store();
        let count: Result<usize, StoreError> = store
            .transaction(|doc| Ok(doc.list_all(Table::Users).len()))
            .await;
        assert_eq!(count.unwrap(), 0);
        assert!(backend.contents().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_reported() {
        let store = RecordStore::new(Arc::new(MemoryBackend::with_blob("{not json")));
        let err = store.list_all(Table::Users).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = RecordStore::in_memory();
        let stored = store
            .insert(Table::Requests, fields(json!({"status": "pending"})))
            .await
            .unwrap();
        let id = stored["id"].as_str().unwrap().to_string();

        let merged = store
            .update(Table::Requests, &id, fields(json!({"status": "rejected"})))
            .await
            .unwrap();
        assert_eq!(merged["status"], json!("rejected"));

        assert!(store.remove(Table::Requests, &id).await.unwrap());
        assert!(!store.remove(Table::Requests, &id).await.unwrap());
        assert!(matches!(
            store.update(Table::Requests, &id, Record::new()).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_serialized() {
        let store = Arc::new(RecordStore::in_memory());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(Table::RakeHistory, fields(json!({"rake_amount": i + 1})))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.list_all(Table::RakeHistory).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = format!("target/test_store_{}/db.json", std::process::id());
        let _ = std::fs::remove_file(&path);

        let store = RecordStore::open_file(&path);
        store
            .insert(Table::Tournaments, fields(json!({"name": "Sunday Main"})))
            .await
            .unwrap();
        drop(store);

        let reopened = RecordStore::open_file(&path);
        let rows = reopened.list_all(Table::Tournaments).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Sunday Main"));

        let _ = std::fs::remove_dir_all(format!("target/test_store_{}", std::process::id()));
    }
}
