//! State backend composed of a blob store and a lock coordinator

use async_trait::async_trait;

use crate::backend::{BackendResult, StateBackend};
use crate::blob::{BlobStore, Payload};
use crate::lock::LockInfo;
use crate::lock_coordinator::LockCoordinator;

/// Remote state: the object holding the document plus its lock
///
/// The two halves share nothing; the coordinator is only consulted by
/// `lock`, `unlock` and `lock_info`.
#[derive(Clone)]
pub struct RemoteState {
    blob: BlobStore,
    locks: LockCoordinator,
}

impl RemoteState {
    pub fn new(blob: BlobStore, locks: LockCoordinator) -> Self {
        Self { blob, locks }
    }

    pub fn blob(&self) -> &BlobStore {
        &self.blob
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }
}

#[async_trait]
impl StateBackend for RemoteState {
    async fn get(&self) -> BackendResult<Option<Payload>> {
        self.blob.read().await
    }

    async fn put(&self, data: &[u8]) -> BackendResult<()> {
        self.blob.write(data).await
    }

    async fn delete(&self) -> BackendResult<()> {
        self.blob.delete().await
    }

    async fn lock(&self, info: &mut LockInfo) -> BackendResult<String> {
        self.locks.acquire(info).await
    }

    async fn unlock(&self, id: &str) -> BackendResult<()> {
        self.locks.release(id).await
    }

    async fn lock_info(&self) -> BackendResult<LockInfo> {
        self.locks.inspect().await
    }
}
