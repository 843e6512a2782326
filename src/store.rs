//! Persisted field-value records: the key/value cache contract and its in-memory implementation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{error::BuildonomyError, fields::FieldKind};

/// Last computed value of one field of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValueRecord {
    pub id: String,
    pub path: String,
    pub field_id: String,
    pub field_name: String,
    pub kind: FieldKind,
    pub value: Value,
    /// Milliseconds since the unix epoch.
    pub updated: i64,
}

impl FieldValueRecord {
    pub fn new(path: &str, field_id: &str, field_name: &str, kind: FieldKind, value: Value) -> Self {
        let updated = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        FieldValueRecord {
            id: FieldValueRecord::key(path, field_id),
            path: path.to_string(),
            field_id: field_id.to_string(),
            field_name: field_name.to_string(),
            kind,
            value,
            updated,
        }
    }

    pub fn key(path: &str, field_id: &str) -> String {
        format!("{path}#{field_id}")
    }

    /// The same record under another document path.
    pub fn moved(&self, path: &str) -> FieldValueRecord {
        FieldValueRecord {
            id: FieldValueRecord::key(path, &self.field_id),
            path: path.to_string(),
            ..self.clone()
        }
    }
}

/// Key/value cache of [FieldValueRecord]s with secondary indexes on document path and field kind.
pub trait FieldValueStore: Sync {
    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<FieldValueRecord>, BuildonomyError>> + Send;

    fn put(
        &self,
        record: FieldValueRecord,
    ) -> impl std::future::Future<Output = Result<(), BuildonomyError>> + Send;

    fn delete(&self, id: &str)
        -> impl std::future::Future<Output = Result<(), BuildonomyError>> + Send;

    fn get_all_by_path(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Vec<FieldValueRecord>, BuildonomyError>> + Send;

    fn get_all_by_kind(
        &self,
        kind: FieldKind,
    ) -> impl std::future::Future<Output = Result<Vec<FieldValueRecord>, BuildonomyError>> + Send;

    fn get_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<FieldValueRecord>, BuildonomyError>> + Send;
}

#[derive(Debug, Default)]
pub struct MemoryStore(RwLock<BTreeMap<String, FieldValueRecord>>);

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

impl FieldValueStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<FieldValueRecord>, BuildonomyError> {
        Ok(self.0.read().get(id).cloned())
    }

    async fn put(&self, record: FieldValueRecord) -> Result<(), BuildonomyError> {
        self.0.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), BuildonomyError> {
        self.0.write().remove(id);
        Ok(())
    }

    async fn get_all_by_path(&self, path: &str) -> Result<Vec<FieldValueRecord>, BuildonomyError> {
        Ok(self
            .0
            .read()
            .values()
            .filter(|r| r.path == path)
            .cloned()
            .collect())
    }

    async fn get_all_by_kind(
        &self,
        kind: FieldKind,
    ) -> Result<Vec<FieldValueRecord>, BuildonomyError> {
        Ok(self
            .0
            .read()
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<FieldValueRecord>, BuildonomyError> {
        Ok(self.0.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_indexes() {
        let store = MemoryStore::new();
        store
            .put(FieldValueRecord::new("a.md", "f1", "total", FieldKind::Formula, json!(3)))
            .await
            .unwrap();
        store
            .put(FieldValueRecord::new("a.md", "f2", "team", FieldKind::Lookup, json!(["[[b]]"])))
            .await
            .unwrap();
        store
            .put(FieldValueRecord::new("b.md", "f1", "total", FieldKind::Formula, json!(1)))
            .await
            .unwrap();

        assert_eq!(store.get_all().await.unwrap().len(), 3);
        assert_eq!(store.get_all_by_path("a.md").await.unwrap().len(), 2);
        assert_eq!(store.get_all_by_kind(FieldKind::Formula).await.unwrap().len(), 2);
        let got = store.get("a.md#f1").await.unwrap().unwrap();
        assert_eq!(got.value, json!(3));

        let moved = got.moved("c.md");
        assert_eq!(moved.id, "c.md#f1");
        store.delete(&got.id).await.unwrap();
        assert!(store.get("a.md#f1").await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }
}
