//! Backend implementations for state storage

pub mod local;
pub mod s3;

use std::sync::Arc;

pub use local::LocalSettings;
pub use s3::S3Settings;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::blob::{BlobConfig, BlobStore};
use crate::lock_coordinator::LockCoordinator;
use crate::remote::RemoteState;
use crate::transport::{MemoryLockTable, MemoryObjectStore};

/// Create a backend from configuration
///
/// This function dispatches to the appropriate backend implementation
/// based on the backend_type in the configuration.
pub async fn create_backend(config: &BackendConfig) -> BackendResult<Box<dyn StateBackend>> {
    match config.backend_type.as_str() {
        "s3" => {
            let backend = s3::from_config(config).await?;
            Ok(Box::new(backend))
        }
        "local" => Ok(Box::new(local::from_config(config)?)),
        "memory" => Ok(Box::new(memory_from_config(config))),
        other => Err(BackendError::unsupported_backend(other)),
    }
}

/// Build an in-process backend with fresh, empty stores
fn memory_from_config(config: &BackendConfig) -> RemoteState {
    let bucket = config.get_non_empty("bucket").unwrap_or("memory");
    let key = config.get_non_empty("key").unwrap_or("state");

    let blob = BlobStore::new(
        Arc::new(MemoryObjectStore::new()),
        bucket,
        key,
        BlobConfig::default(),
    );
    let locks = match config.get_non_empty("lock_table") {
        Some(table) => LockCoordinator::new(bucket, key, Arc::new(MemoryLockTable::new()), table),
        None => LockCoordinator::disabled(bucket, key),
    };

    RemoteState::new(blob, locks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockInfo;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_unsupported_backend() {
        let config = BackendConfig {
            backend_type: "unsupported".to_string(),
            attributes: HashMap::new(),
        };

        let result = create_backend(&config).await;
        assert!(result.is_err());

        if let Err(BackendError::UnsupportedBackend(name)) = result {
            assert_eq!(name, "unsupported");
        } else {
            panic!("Expected UnsupportedBackend error");
        }
    }

    #[tokio::test]
    async fn test_s3_backend_rejects_incomplete_config() {
        let config = BackendConfig::from_json(r#"{"backend": "s3", "bucket": "b"}"#).unwrap();
        assert!(matches!(
            create_backend(&config).await,
            Err(BackendError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let config =
            BackendConfig::from_json(r#"{"backend": "memory", "lock_table": "locks"}"#).unwrap();
        let backend = create_backend(&config).await.unwrap();

        backend.put(b"hello").await.unwrap();
        assert_eq!(backend.get().await.unwrap().unwrap().as_bytes(), b"hello");

        let mut info = LockInfo::new("apply");
        let id = backend.lock(&mut info).await.unwrap();
        assert_eq!(info.path, "memory/state");
        backend.unlock(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_backend_without_lock_table() {
        let config = BackendConfig::from_json(r#"{"backend": "memory"}"#).unwrap();
        let backend = create_backend(&config).await.unwrap();

        assert_eq!(backend.lock(&mut LockInfo::new("apply")).await.unwrap(), "");
        backend.unlock("").await.unwrap();
    }
}
