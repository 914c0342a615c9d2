//! Transports the state backend is built on
//!
//! Two narrow seams: an object store addressed by (bucket, key), and a
//! table offering an atomic insert-if-absent keyed by lock path. Each has an
//! AWS implementation, a local filesystem one and an in-memory one.

pub mod dynamodb;
pub mod local;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dynamodb::DynamoDbLockTable;
pub use local::{LocalLockTable, LocalObjectStore};
pub use memory::{MemoryLockTable, MemoryObjectStore};
pub use s3::S3Transport;

/// Errors reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The requested object does not exist
    #[error("object not found")]
    NotFound,

    /// A conditional write was rejected because its precondition failed
    #[error("conditional request failed")]
    ConditionFailed,

    /// Any other network, auth or service fault
    #[error("{0}")]
    Service(String),
}

impl TransportError {
    pub fn service(message: impl ToString) -> Self {
        Self::Service(message.to_string())
    }
}

/// Server-side encryption requested for an object write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSideEncryption {
    /// Store-managed symmetric key (`AES256`)
    Aes256,
    /// Customer-managed key (`aws:kms`)
    Kms { key_id: String },
}

/// A whole-object write
#[derive(Debug, Clone)]
pub struct PutObject<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub body: Vec<u8>,
    pub content_type: &'a str,
    pub encryption: Option<ServerSideEncryption>,
    pub acl: Option<&'a str>,
}

/// Object store holding the state blob
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Fetch the whole object; `TransportError::NotFound` when it is absent
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, TransportError>;

    /// Overwrite the whole object
    async fn put(&self, request: PutObject<'_>) -> Result<(), TransportError>;

    /// Remove the object. Removing a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), TransportError>;
}

/// A row of the lock table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockItem {
    /// Primary key: the resource path
    #[serde(rename = "LockID")]
    pub lock_id: String,
    /// Serialized `LockInfo`
    pub info: String,
}

/// Table with an atomic conditional insert, keyed by lock path
#[async_trait]
pub trait LockTable: Send + Sync {
    /// Insert `item` only if no row with the same `lock_id` exists.
    /// Fails with `TransportError::ConditionFailed` when one does.
    async fn put_if_absent(&self, table: &str, item: LockItem) -> Result<(), TransportError>;

    /// Fetch the row for `lock_id`, if any
    async fn get(&self, table: &str, lock_id: &str) -> Result<Option<LockItem>, TransportError>;

    /// Delete the row for `lock_id`. Deleting a missing row succeeds.
    async fn delete(&self, table: &str, lock_id: &str) -> Result<(), TransportError>;
}
