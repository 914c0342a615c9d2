use std::sync::Arc;

use strata_state::transport::{
    LocalLockTable, LocalObjectStore, MemoryLockTable, MemoryObjectStore,
};
use strata_state::{
    BackendError, BlobConfig, BlobStore, LockCoordinator, LockInfo, RemoteState, StateBackend,
};

const BUCKET: &str = "tf-remote-state";
const KEY: &str = "testState";

fn memory_backend(lock_table: Option<&str>) -> RemoteState {
    let blob = BlobStore::new(
        Arc::new(MemoryObjectStore::new()),
        BUCKET,
        KEY,
        BlobConfig {
            encrypt: true,
            ..BlobConfig::default()
        },
    );
    let locks = match lock_table {
        Some(table) => LockCoordinator::new(BUCKET, KEY, Arc::new(MemoryLockTable::new()), table),
        None => LockCoordinator::disabled(BUCKET, KEY),
    };
    RemoteState::new(blob, locks)
}

/// Two independent backends sharing the same stores, like two processes
fn shared_backends() -> (RemoteState, RemoteState) {
    let objects = Arc::new(MemoryObjectStore::new());
    let table = Arc::new(MemoryLockTable::new());

    let make = || {
        RemoteState::new(
            BlobStore::new(objects.clone(), BUCKET, KEY, BlobConfig::default()),
            LockCoordinator::new(BUCKET, KEY, table.clone(), "locks"),
        )
    };
    (make(), make())
}

#[tokio::test]
async fn write_then_read_returns_payload() {
    let backend = memory_backend(None);
    backend.put(b"hello").await.unwrap();

    let payload = backend.get().await.unwrap().unwrap();
    assert_eq!(payload.as_bytes(), b"hello");
}

#[tokio::test]
async fn zero_length_write_reads_back_as_absent() {
    let backend = memory_backend(None);
    backend.put(b"").await.unwrap();
    assert!(backend.get().await.unwrap().is_none());
}

#[tokio::test]
async fn lock_conflict_reports_holder_then_release_allows_reacquire() {
    let (b1, b2) = shared_backends();

    let mut info = LockInfo::new("apply").with_info("apply");
    let id1 = b1.lock(&mut info).await.unwrap();

    let err = b2.lock(&mut LockInfo::new("plan")).await.unwrap_err();
    assert!(matches!(err, BackendError::LockConflict { .. }));
    let holder = err.lock_info().unwrap();
    assert_eq!(holder.id, id1);
    assert_eq!(holder.info, "apply");
    assert_eq!(holder.path, format!("{}/{}", BUCKET, KEY));

    b1.unlock(&id1).await.unwrap();

    let id2 = b2.lock(&mut LockInfo::new("apply")).await.unwrap();
    assert_ne!(id1, id2);
    b2.unlock(&id2).await.unwrap();
}

#[tokio::test]
async fn release_with_wrong_id_keeps_lock_held() {
    let (b1, b2) = shared_backends();
    let id1 = b1.lock(&mut LockInfo::new("apply")).await.unwrap();

    let err = b2.unlock("wrong-id").await.unwrap_err();
    assert!(matches!(err, BackendError::LockMismatch { .. }));
    assert_eq!(err.lock_info().unwrap().id, id1);

    // Still held: a later acquire conflicts
    let err = b2.lock(&mut LockInfo::new("apply")).await.unwrap_err();
    assert_eq!(err.lock_info().unwrap().id, id1);
}

#[tokio::test]
async fn delete_of_never_written_key_succeeds() {
    let backend = memory_backend(None);
    backend.delete().await.unwrap();
}

#[tokio::test]
async fn release_after_release_is_not_found() {
    let backend = memory_backend(Some("locks"));
    let id = backend.lock(&mut LockInfo::new("apply")).await.unwrap();
    backend.unlock(&id).await.unwrap();

    let err = backend.unlock(&id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn disabled_locking_is_consistent() {
    let backend = memory_backend(None);

    assert_eq!(backend.lock(&mut LockInfo::new("apply")).await.unwrap(), "");
    assert_eq!(backend.lock(&mut LockInfo::new("apply")).await.unwrap(), "");
    backend.unlock("").await.unwrap();
    backend.unlock("anything").await.unwrap();
}

#[tokio::test]
async fn concurrent_acquires_across_processes_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let mut tasks = Vec::new();
    for n in 0..8 {
        let root = root.clone();
        tasks.push(tokio::spawn(async move {
            let backend = RemoteState::new(
                BlobStore::new(
                    Arc::new(LocalObjectStore::new(&root)),
                    BUCKET,
                    KEY,
                    BlobConfig::default(),
                ),
                LockCoordinator::new(BUCKET, KEY, Arc::new(LocalLockTable::new(&root)), "locks"),
            );
            backend
                .lock(&mut LockInfo::new("apply").with_info(format!("worker {}", n)))
                .await
        }));
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(id) => winners.push(id),
            Err(err) => losers.push(err),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 7);
    for err in &losers {
        assert!(matches!(err, BackendError::LockConflict { .. }));
        assert_eq!(err.lock_info().unwrap().id, winners[0]);
    }
}
