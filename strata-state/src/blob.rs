//! Read, write and delete of the state object

use std::sync::Arc;

use log::debug;

use crate::backend::{BackendError, BackendResult};
use crate::transport::{ObjectTransport, PutObject, ServerSideEncryption, TransportError};

/// Content type of every state upload
pub const STATE_CONTENT_TYPE: &str = "application/json";

/// State payload as read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Write options applied to every upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobConfig {
    /// Request server-side encryption
    pub encrypt: bool,
    /// Customer-managed KMS key; only used when `encrypt` is set
    pub kms_key_id: Option<String>,
    /// Canned ACL attached verbatim to uploads
    pub acl: Option<String>,
}

impl BlobConfig {
    /// Encryption to request for an upload
    pub fn server_side_encryption(&self) -> Option<ServerSideEncryption> {
        if !self.encrypt {
            return None;
        }

        match self.kms_key_id.as_deref().filter(|id| !id.is_empty()) {
            Some(key_id) => Some(ServerSideEncryption::Kms {
                key_id: key_id.to_string(),
            }),
            None => Some(ServerSideEncryption::Aes256),
        }
    }

    fn acl(&self) -> Option<&str> {
        self.acl.as_deref().filter(|acl| !acl.is_empty())
    }
}

/// The state object at (bucket, key)
///
/// No concurrency control happens here; writes overwrite unconditionally.
/// Callers that need exclusion go through the lock coordinator first.
#[derive(Clone)]
pub struct BlobStore {
    client: Arc<dyn ObjectTransport>,
    bucket: String,
    key: String,
    config: BlobConfig,
}

impl BlobStore {
    pub fn new(
        client: Arc<dyn ObjectTransport>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        config: BlobConfig,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
            config,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Read the whole object. Missing and empty objects are both `None`.
    pub async fn read(&self) -> BackendResult<Option<Payload>> {
        match self.client.get(&self.bucket, &self.key).await {
            Ok(data) if data.is_empty() => Ok(None),
            Ok(data) => Ok(Some(Payload { data })),
            Err(TransportError::NotFound) => Ok(None),
            Err(err) => Err(BackendError::Transport(err)),
        }
    }

    /// Overwrite the object with `data`
    pub async fn write(&self, data: &[u8]) -> BackendResult<()> {
        let request = PutObject {
            bucket: &self.bucket,
            key: &self.key,
            body: data.to_vec(),
            content_type: STATE_CONTENT_TYPE,
            encryption: self.config.server_side_encryption(),
            acl: self.config.acl(),
        };

        debug!(
            "Uploading remote state: bucket={} key={} length={} encryption={:?} acl={:?}",
            request.bucket,
            request.key,
            request.body.len(),
            request.encryption,
            request.acl
        );

        self.client.put(request).await.map_err(BackendError::Upload)
    }

    /// Remove the object unconditionally
    pub async fn delete(&self) -> BackendResult<()> {
        self.client
            .delete(&self.bucket, &self.key)
            .await
            .map_err(BackendError::Transport)
    }
}
