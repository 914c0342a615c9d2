//! Lock coordination over a conditional-write table
//!
//! A resource is locked exactly when its lock table has a row keyed by the
//! resource path. Exclusion comes entirely from the table's insert-if-absent;
//! the coordinator itself keeps no lock state and can be shared freely.
//!
//! There is no lease or expiry. A lock left behind by a crashed process
//! stays until someone releases it with the holder's identifier.

use std::sync::Arc;

use log::{debug, warn};

use crate::backend::{BackendError, BackendResult};
use crate::lock::LockInfo;
use crate::transport::{LockItem, LockTable};

#[derive(Clone)]
struct TableHandle {
    client: Arc<dyn LockTable>,
    name: String,
}

/// Acquires, inspects and releases the lock for one resource path
#[derive(Clone)]
pub struct LockCoordinator {
    table: Option<TableHandle>,
    path: String,
}

impl LockCoordinator {
    /// Coordinator for (bucket, key) backed by `table` on `client`
    pub fn new(
        bucket: &str,
        key: &str,
        client: Arc<dyn LockTable>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            table: Some(TableHandle {
                client,
                name: table.into(),
            }),
            path: lock_path(bucket, key),
        }
    }

    /// Coordinator with locking turned off: acquire and release always succeed
    pub fn disabled(bucket: &str, key: &str) -> Self {
        Self {
            table: None,
            path: lock_path(bucket, key),
        }
    }

    /// Resource path used as the lock table's primary key
    pub fn lock_path(&self) -> &str {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.table.is_some()
    }

    /// Take the lock, returning its identifier
    ///
    /// Generates `info.id` when empty and sets `info.path`. Makes exactly one
    /// insert attempt; retrying or waiting is up to the caller. When locking
    /// is disabled this returns an empty identifier.
    pub async fn acquire(&self, info: &mut LockInfo) -> BackendResult<String> {
        let Some(table) = &self.table else {
            return Ok(String::new());
        };

        if info.id.is_empty() {
            info.id = uuid::Uuid::new_v4().to_string();
        }
        info.path = self.path.clone();

        let item = LockItem {
            lock_id: self.path.clone(),
            info: info.marshal()?,
        };

        debug!("Acquiring lock {} on {}", info.id, self.path);

        let err = match table.client.put_if_absent(&table.name, item).await {
            Ok(()) => return Ok(info.id.clone()),
            Err(err) => BackendError::Transport(err),
        };

        let (holder, source) = match self.fetch(table).await {
            Ok(existing) => (Some(Box::new(existing)), err),
            Err(info_err) => {
                warn!(
                    "Could not read the existing lock on {}: {}",
                    self.path, info_err
                );
                (None, BackendError::Aggregate(vec![err, info_err]))
            }
        };

        Err(BackendError::LockConflict {
            info: holder,
            source: Box::new(source),
        })
    }

    /// Read the current lock record
    pub async fn inspect(&self) -> BackendResult<LockInfo> {
        match &self.table {
            Some(table) => self.fetch(table).await,
            None => Err(BackendError::LockingDisabled),
        }
    }

    /// Release the lock held under `id`
    ///
    /// The identifier is compared against the one inside the stored info
    /// before the row is deleted. The read and the delete are two requests,
    /// so the check is not atomic with the delete; a conditional delete on a
    /// dedicated identifier attribute would close that gap.
    pub async fn release(&self, id: &str) -> BackendResult<()> {
        let Some(table) = &self.table else {
            return Ok(());
        };

        let existing = self
            .fetch(table)
            .await
            .map_err(|e| BackendError::LockRetrieval {
                source: Box::new(e),
            })?;

        if existing.id != id {
            return Err(BackendError::LockMismatch {
                id: id.to_string(),
                info: Box::new(existing),
            });
        }

        debug!("Releasing lock {} on {}", id, self.path);

        table
            .client
            .delete(&table.name, &self.path)
            .await
            .map_err(|source| BackendError::LockRelease {
                info: Box::new(existing),
                source,
            })
    }

    async fn fetch(&self, table: &TableHandle) -> BackendResult<LockInfo> {
        let item = table
            .client
            .get(&table.name, &self.path)
            .await?
            .ok_or_else(|| BackendError::LockNotFound(self.path.clone()))?;

        LockInfo::parse(&item.info)
    }
}

/// Lock path for a state object: `<bucket>/<key>`
pub fn lock_path(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}
