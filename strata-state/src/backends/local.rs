//! Local file backend for state storage
//!
//! Stores state under a local directory (default: `.strata`). Locking uses a
//! directory of lock rows when `lock_table` is set.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackendConfig, BackendError, BackendResult};
use crate::blob::{BlobConfig, BlobStore};
use crate::lock_coordinator::LockCoordinator;
use crate::remote::RemoteState;
use crate::transport::{LocalLockTable, LocalObjectStore};

/// Default root directory
pub const DEFAULT_ROOT: &str = ".strata";

/// Default bucket (sub-directory of the root)
pub const DEFAULT_BUCKET: &str = "state";

/// Default state file name
pub const DEFAULT_KEY: &str = "strata.state.json";

/// Settings accepted by the "local" backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSettings {
    pub root: PathBuf,
    pub bucket: String,
    pub key: String,
    pub lock_table: Option<String>,
}

impl LocalSettings {
    /// Read settings, rejecting names that would resolve outside `root`
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let bucket = config.get_non_empty("bucket").unwrap_or(DEFAULT_BUCKET);
        let key = config.get_non_empty("key").unwrap_or(DEFAULT_KEY);
        let lock_table = config.get_non_empty("lock_table");

        check_relative("bucket", bucket)?;
        check_relative("key", key)?;
        if let Some(table) = lock_table {
            check_relative("lock_table", table)?;
        }

        Ok(Self {
            root: PathBuf::from(config.get_non_empty("path").unwrap_or(DEFAULT_ROOT)),
            bucket: bucket.to_string(),
            key: key.to_string(),
            lock_table: lock_table.map(str::to_string),
        })
    }
}

/// Only plain path segments are allowed below the root
fn check_relative(attribute: &str, value: &str) -> BackendResult<()> {
    let nested = Path::new(value)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if nested {
        Ok(())
    } else {
        Err(BackendError::configuration(format!(
            "Attribute '{}' must be a relative path without '..': {}",
            attribute, value
        )))
    }
}

/// Build a filesystem-backed remote state from configuration
pub fn from_config(config: &BackendConfig) -> BackendResult<RemoteState> {
    let settings = LocalSettings::from_config(config)?;

    let store = LocalObjectStore::new(&settings.root);
    let blob = BlobStore::new(
        Arc::new(store),
        &settings.bucket,
        &settings.key,
        BlobConfig::default(),
    );

    let locks = match &settings.lock_table {
        Some(table) => LockCoordinator::new(
            &settings.bucket,
            &settings.key,
            Arc::new(LocalLockTable::new(&settings.root)),
            table,
        ),
        None => LockCoordinator::disabled(&settings.bucket, &settings.key),
    };

    Ok(RemoteState::new(blob, locks))
}
