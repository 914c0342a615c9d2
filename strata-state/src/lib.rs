//! Strata State Storage
//!
//! This crate stores a single shared state document in a remote object store
//! and coordinates writers with a lock table that supports an atomic
//! insert-if-absent.
//!
//! # Overview
//!
//! - **BlobStore**: reads, writes and deletes the state object
//! - **LockCoordinator**: acquires, inspects and releases the lock for the
//!   object's resource path
//! - **StateBackend**: the operations an orchestration layer drives, with
//!   S3/DynamoDB, local filesystem and in-memory implementations
//! - **LockInfo**: who holds a lock, for what, and since when
//!
//! # Example
//!
//! ```ignore
//! use strata_state::{create_backend, BackendConfig, LockInfo};
//!
//! let config = BackendConfig::from_json(r#"{
//!     "backend": "s3",
//!     "bucket": "my-state-bucket",
//!     "key": "infra/prod/terraform.tfstate",
//!     "region": "ap-northeast-1",
//!     "encrypt": true,
//!     "lock_table": "state-locks"
//! }"#)?;
//!
//! let backend = create_backend(&config).await?;
//!
//! // Acquire lock before modifying state
//! let mut info = LockInfo::new("apply");
//! let lock_id = backend.lock(&mut info).await?;
//!
//! let current = backend.get().await?;
//! // ... modify ...
//! backend.put(&updated).await?;
//!
//! backend.unlock(&lock_id).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod blob;
pub mod lock;
pub mod lock_coordinator;
pub mod remote;
pub mod transport;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::create_backend;
pub use blob::{BlobConfig, BlobStore, Payload};
pub use lock::LockInfo;
pub use lock_coordinator::LockCoordinator;
pub use remote::RemoteState;
pub use transport::TransportError;
