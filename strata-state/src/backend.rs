//! State backend trait and error types

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::blob::Payload;
use crate::lock::LockInfo;
use crate::transport::TransportError;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The object or table transport failed
    #[error("Remote store error: {0}")]
    Transport(#[from] TransportError),

    /// Writing the state object failed
    #[error("Failed to upload state: {0}")]
    Upload(#[source] TransportError),

    /// The conditional insert of a lock row failed, usually because the
    /// state is already locked. `info` describes the current holder when it
    /// could be fetched.
    #[error("Error acquiring the state lock: {source}{}", describe_holder(.info))]
    LockConflict {
        info: Option<Box<LockInfo>>,
        source: Box<BackendError>,
    },

    /// Release was attempted with an identifier that does not own the lock
    #[error("Lock ID {id:?} does not match existing lock{}", describe_lock(.info))]
    LockMismatch { id: String, info: Box<LockInfo> },

    /// The current lock could not be read while releasing
    #[error("Failed to retrieve lock info: {source}")]
    LockRetrieval { source: Box<BackendError> },

    /// The lock row could not be deleted
    #[error("Failed to release the state lock: {source}{}", describe_lock(.info))]
    LockRelease {
        info: Box<LockInfo>,
        #[source]
        source: TransportError,
    },

    /// No lock row exists for the resource path
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// The backend has no lock table configured
    #[error("Locking is not enabled for this backend")]
    LockingDisabled,

    /// The stored lock info could not be parsed
    #[error("Invalid lock info: {0}")]
    InvalidLockInfo(String),

    /// Several independent failures, all preserved
    #[error("{}", describe_all(.0))]
    Aggregate(Vec<BackendError>),

    /// The backend type is not supported
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// Configuration error
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Create an unsupported backend error
    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Info about the lock holder attached to this error, if any
    pub fn lock_info(&self) -> Option<&LockInfo> {
        match self {
            Self::LockConflict { info, .. } => info.as_deref(),
            Self::LockMismatch { info, .. } | Self::LockRelease { info, .. } => Some(info.as_ref()),
            _ => None,
        }
    }

    /// Whether this error ultimately means "nothing is there"
    ///
    /// A lock conflict is never "nothing is there", even when the holder
    /// could not be fetched afterwards.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::LockNotFound(_) | Self::Transport(TransportError::NotFound) => true,
            Self::LockRetrieval { source } => source.is_not_found(),
            Self::Aggregate(errors) => {
                !errors.is_empty() && errors.iter().all(Self::is_not_found)
            }
            _ => false,
        }
    }
}

fn describe_holder(info: &Option<Box<LockInfo>>) -> String {
    info.as_deref().map(describe_lock).unwrap_or_default()
}

fn describe_lock(info: &LockInfo) -> String {
    format!("\n\n{}", info)
}

fn describe_all(errors: &[BackendError]) -> String {
    let mut out = format!("{} errors occurred:", errors.len());
    for error in errors {
        out.push_str(&format!("\n\t* {}", error));
    }
    out
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Trait for state storage backends
///
/// The operations the orchestration layer drives: read, write and delete of
/// the state object, plus lock and unlock around mutations.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state payload
    ///
    /// Returns `None` if no state exists (first-time use) or it is empty
    async fn get(&self) -> BackendResult<Option<Payload>>;

    /// Overwrite the state payload
    async fn put(&self, data: &[u8]) -> BackendResult<()>;

    /// Delete the state object
    async fn delete(&self) -> BackendResult<()>;

    /// Acquire the state lock, returning its identifier
    ///
    /// `info.id` is generated when empty and `info.path` is set to the
    /// resource path. Returns an empty identifier when locking is disabled.
    async fn lock(&self, info: &mut LockInfo) -> BackendResult<String>;

    /// Release the state lock held under `id`
    async fn unlock(&self, id: &str) -> BackendResult<()>;

    /// Read information about the current lock holder
    async fn lock_info(&self) -> BackendResult<LockInfo>;
}

/// Configuration for a state backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (e.g., "s3", "local", "memory")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, serde_json::Value>,
}

impl BackendConfig {
    /// Parse a JSON object such as `{"backend": "s3", "bucket": "..."}`
    pub fn from_json(content: &str) -> BackendResult<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| BackendError::configuration(format!("Invalid backend config: {}", e)))?;

        let serde_json::Value::Object(map) = value else {
            return Err(BackendError::configuration(
                "Backend config must be a JSON object",
            ));
        };

        let mut attributes: HashMap<String, serde_json::Value> = map.into_iter().collect();
        let backend_type = match attributes.remove("backend") {
            Some(serde_json::Value::String(s)) => s,
            Some(_) => {
                return Err(BackendError::configuration(
                    "Attribute 'backend' must be a string",
                ));
            }
            None => return Err(BackendError::configuration("Missing attribute: backend")),
        };

        Ok(Self {
            backend_type,
            attributes,
        })
    }

    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key) {
            Some(serde_json::Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get a string attribute, treating an empty string as unset
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get_string(key).filter(|s| !s.is_empty())
    }

    /// Get a required, non-empty string attribute
    pub fn require_string(&self, key: &str) -> BackendResult<&str> {
        self.get_non_empty(key).ok_or_else(|| {
            BackendError::configuration(format!("Missing required attribute: {}", key))
        })
    }

    /// Get a boolean attribute value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.attributes.get(key) {
            Some(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get a boolean attribute with a default value
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}
