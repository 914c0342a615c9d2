//! In-process transports
//!
//! Useful for tests and for embedding a backend that never leaves the
//! process. The mutexes here stand in for the remote store's own atomicity;
//! they are never held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    LockItem, LockTable, ObjectTransport, PutObject, ServerSideEncryption, TransportError,
};

/// An object as last written to a [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub encryption: Option<ServerSideEncryption>,
    pub acl: Option<String>,
}

/// Object store kept in a hash map
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the object stored under (bucket, key), including write options
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectTransport for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, TransportError> {
        self.object(bucket, key)
            .map(|object| object.body)
            .ok_or(TransportError::NotFound)
    }

    async fn put(&self, request: PutObject<'_>) -> Result<(), TransportError> {
        let object = StoredObject {
            body: request.body,
            content_type: request.content_type.to_string(),
            encryption: request.encryption,
            acl: request.acl.map(str::to_string),
        };
        self.objects()
            .insert((request.bucket.to_string(), request.key.to_string()), object);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), TransportError> {
        self.objects()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Lock table kept in a hash map, keyed by (table, lock id)
#[derive(Debug, Default)]
pub struct MemoryLockTable {
    rows: Mutex<HashMap<(String, String), LockItem>>,
}

impl MemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a row unconditionally, bypassing the insert precondition
    pub fn insert_raw(&self, table: &str, item: LockItem) {
        self.rows()
            .insert((table.to_string(), item.lock_id.clone()), item);
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<(String, String), LockItem>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LockTable for MemoryLockTable {
    async fn put_if_absent(&self, table: &str, item: LockItem) -> Result<(), TransportError> {
        let mut rows = self.rows();
        let key = (table.to_string(), item.lock_id.clone());
        if rows.contains_key(&key) {
            return Err(TransportError::ConditionFailed);
        }
        rows.insert(key, item);
        Ok(())
    }

    async fn get(&self, table: &str, lock_id: &str) -> Result<Option<LockItem>, TransportError> {
        Ok(self
            .rows()
            .get(&(table.to_string(), lock_id.to_string()))
            .cloned())
    }

    async fn delete(&self, table: &str, lock_id: &str) -> Result<(), TransportError> {
        self.rows()
            .remove(&(table.to_string(), lock_id.to_string()));
        Ok(())
    }
}
