//! In-memory document store.
//!
//! Collections are kept in insertion order behind one async `RwLock`. Every
//! operation must obtain the lock within the configured operation timeout,
//! otherwise it fails with [`StoreError::Unavailable`], the same signal a
//! remote store gives when it cannot be reached in time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::{Timestamp, Uuid};

use crate::query::run_pipeline;
use crate::{Document, DocumentStore, Filter, Stage, StoreError, StoreResult, ID_FIELD};

type Collections = HashMap<String, Vec<Document>>;

pub struct MemoryStore {
    collections: RwLock<Collections>,
    operation_timeout: Duration,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(operation_timeout: Duration) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            operation_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Refuse every further operation with `Unavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        Ok(())
    }

    fn timed_out(&self) -> StoreError {
        StoreError::Unavailable(format!(
            "operation timed out after {}ms",
            self.operation_timeout.as_millis()
        ))
    }

    async fn read(&self) -> StoreResult<RwLockReadGuard<'_, Collections>> {
        self.ensure_open()?;
        tokio::time::timeout(self.operation_timeout, self.collections.read())
            .await
            .map_err(|_| self.timed_out())
    }

    async fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Collections>> {
        self.ensure_open()?;
        tokio::time::timeout(self.operation_timeout, self.collections.write())
            .await
            .map_err(|_| self.timed_out())
    }

    /// Restore all collections from a snapshot file. A missing file leaves the
    /// store empty. Returns the number of documents loaded.
    pub async fn load_snapshot(&self, path: &Path) -> anyhow::Result<usize> {
        if !tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("failed to inspect snapshot {}", path.display()))?
        {
            tracing::info!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(0);
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let data: Collections = serde_json::from_slice(&bytes)
            .with_context(|| format!("snapshot {} is not valid JSON", path.display()))?;

        let mut loaded = 0;
        for (collection, docs) in &data {
            for doc in docs {
                let id = doc.get(ID_FIELD).map(key_of).transpose()?.flatten();
                if id.is_none() {
                    anyhow::bail!(
                        "snapshot document in collection '{}' has no usable {}",
                        collection,
                        ID_FIELD
                    );
                }
                loaded += 1;
            }
        }

        *self.write().await? = data;
        Ok(loaded)
    }

    /// Write all collections to `path`, replacing it atomically. Returns the
    /// number of documents written.
    pub async fn save_snapshot(&self, path: &Path) -> anyhow::Result<usize> {
        let guard = tokio::time::timeout(self.operation_timeout, self.collections.read())
            .await
            .map_err(|_| self.timed_out())?;
        let written = guard.values().map(Vec::len).sum();
        let bytes = serde_json::to_vec_pretty(&*guard).context("failed to encode snapshot")?;
        drop(guard);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to move snapshot into {}", path.display()))?;

        Ok(written)
    }
}

/// Identifier string for an `_id` value. Strings and integers are accepted.
fn key_of(value: &Value) -> StoreResult<Option<String>> {
    match value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        other => Err(StoreError::InvalidDocument(format!(
            "{} must be a string or an integer, got {}",
            ID_FIELD, other
        ))),
    }
}

fn has_id(doc: &Document, id: &str) -> bool {
    matches!(doc.get(ID_FIELD).map(key_of), Some(Ok(Some(key))) if key == id)
}

fn new_id() -> String {
    Uuid::new_v7(Timestamp::now(uuid::NoContext)).to_string()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, collection: &str, mut doc: Document) -> StoreResult<String> {
        let supplied = doc.get(ID_FIELD).map(key_of).transpose()?.flatten();

        let mut collections = self.write().await?;
        let docs = collections.entry(collection.to_string()).or_default();

        let id = match supplied {
            Some(id) => {
                if docs.iter().any(|d| has_id(d, &id)) {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        id,
                    });
                }
                id
            }
            None => {
                let id = new_id();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        docs.push(doc);
        tracing::debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    async fn find_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.read().await?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| has_id(d, id)))
            .cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.read().await?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|d| filter.matches(d))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        mut doc: Document,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.write().await?;
        let Some(slot) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| has_id(d, id)))
        else {
            return Ok(None);
        };

        // The identifier is immutable; whatever the replacement carries is dropped.
        let original_id = slot.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        doc.insert(ID_FIELD.to_string(), original_id);
        *slot = doc;

        tracing::debug!(collection, id, "document replaced");
        Ok(Some(slot.clone()))
    }

    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let mut collections = self.write().await?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(pos) = docs.iter().position(|d| has_id(d, id)) else {
            return Ok(false);
        };
        docs.remove(pos);
        tracing::debug!(collection, id, "document deleted");
        Ok(true)
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let collections = self.read().await?;
        Ok(collections.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>> {
        let docs = {
            let collections = self.read().await?;
            collections.get(collection).cloned().unwrap_or_default()
        };
        Ok(run_pipeline(docs, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new(Duration::from_millis(200))
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn insert_assigns_unique_ids() {
        let store = store();
        let a = store.insert_one("books", doc(json!({"t": 1}))).await.unwrap();
        let b = store.insert_one("books", doc(json!({"t": 2}))).await.unwrap();
        assert_ne!(a, b);

        let found = store.find_one("books", &a).await.unwrap().unwrap();
        assert_eq!(found["_id"], json!(a));
        assert_eq!(found["t"], json!(1));
    }

    #[tokio::test]
    async fn supplied_id_is_kept_and_duplicates_rejected() {
        let store = store();
        let id = store
            .insert_one("raw", doc(json!({"_id": "fixed", "v": 1})))
            .await
            .unwrap();
        assert_eq!(id, "fixed");

        let err = store
            .insert_one("raw", doc(json!({"_id": "fixed", "v": 2})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateKey {
                collection: "raw".into(),
                id: "fixed".into()
            }
        );

        // Integer identifiers compare by their decimal form.
        store.insert_one("raw", doc(json!({"_id": 7}))).await.unwrap();
        assert!(store.find_one("raw", "7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unusable_id_is_invalid() {
        let err = store()
            .insert_one("raw", doc(json!({"_id": [1, 2]})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn replace_keeps_id_and_returns_new_state() {
        let store = store();
        let id = store.insert_one("books", doc(json!({"v": 1}))).await.unwrap();

        let replaced = store
            .replace_one("books", &id, doc(json!({"_id": "hijack", "w": 2})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced["_id"], json!(id));
        assert_eq!(replaced["w"], json!(2));
        assert!(replaced.get("v").is_none());

        assert!(store
            .replace_one("books", "missing", Document::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_and_count() {
        let store = store();
        let id = store.insert_one("books", Document::new()).await.unwrap();
        store.insert_one("books", Document::new()).await.unwrap();
        assert_eq!(store.count("books").await.unwrap(), 2);

        assert!(store.delete_one("books", &id).await.unwrap());
        assert!(!store.delete_one("books", &id).await.unwrap());
        assert_eq!(store.count("books").await.unwrap(), 1);
        assert_eq!(store.count("empty").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_respects_filter_order_and_limit() {
        let store = store();
        for price in [5.0, 50.0, 500.0, 5000.0] {
            store
                .insert_one("books", doc(json!({"price": price})))
                .await
                .unwrap();
        }
        let filter = Filter::range("price", Some(0.0), Some(1000.0));
        let all = store.find("books", &filter, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0]["price"], json!(5.0));

        let limited = store.find("books", &filter, Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert!(store.find("nothing", &Filter::All, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = store();
        store.close();
        let err = store.count("books").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn lock_contention_times_out_as_unavailable() {
        let store = MemoryStore::new(Duration::from_millis(20));
        let _guard = store.collections.write().await;
        let err = store.find_one("books", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("libris-snapshot-{}", std::process::id()))
            .join("store.json");

        let store = store();
        let id = store.insert_one("books", doc(json!({"title": "Dune"}))).await.unwrap();
        assert_eq!(store.save_snapshot(&path).await.unwrap(), 1);

        let restored = MemoryStore::new(Duration::from_millis(200));
        assert_eq!(restored.load_snapshot(&path).await.unwrap(), 1);
        let found = restored.find_one("books", &id).await.unwrap().unwrap();
        assert_eq!(found["title"], json!("Dune"));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn missing_snapshot_loads_nothing() {
        let path = std::env::temp_dir().join("libris-snapshot-does-not-exist.json");
        assert_eq!(store().load_snapshot(&path).await.unwrap(), 0);
    }
}
