//! Local filesystem transports
//!
//! Objects live at `<root>/<bucket>/<key>`. Lock rows are files under
//! `<root>/<table>/`, created with a hard link from a fully written temporary
//! file, so an insert either fails with `AlreadyExists` or publishes the whole
//! row at once.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;

use super::{LockItem, LockTable, ObjectTransport, PutObject, TransportError};

/// Object store rooted at a local directory, for development and simple use cases
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the file holding (bucket, key)
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl ObjectTransport for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, TransportError> {
        let path = self.object_path(bucket, key);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TransportError::NotFound),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    async fn put(&self, request: PutObject<'_>) -> Result<(), TransportError> {
        let path = self.object_path(request.bucket, request.key);
        if request.encryption.is_some() || request.acl.is_some() {
            debug!(
                "Ignoring encryption and ACL settings for local object {}",
                path.display()
            );
        }

        create_parent(&path).await?;

        // Write next to the target and rename so readers never see a partial file
        let tmp = temp_path(&path);
        fs::write(&tmp, &request.body)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error("rename", &path, e));
        }
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), TransportError> {
        remove_if_exists(&self.object_path(bucket, key)).await
    }
}

/// Lock table stored as one file per row
#[derive(Debug, Clone)]
pub struct LocalLockTable {
    root: PathBuf,
}

impl LocalLockTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the file holding the row for `lock_id`
    pub fn row_path(&self, table: &str, lock_id: &str) -> PathBuf {
        self.root.join(table).join(encode_lock_id(lock_id))
    }
}

#[async_trait]
impl LockTable for LocalLockTable {
    async fn put_if_absent(&self, table: &str, item: LockItem) -> Result<(), TransportError> {
        let path = self.row_path(table, &item.lock_id);
        let content = serde_json::to_vec(&item).map_err(TransportError::service)?;

        create_parent(&path).await?;
        let tmp = temp_path(&path);
        fs::write(&tmp, content)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;

        let linked = fs::hard_link(&tmp, &path).await;
        let _ = fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(TransportError::ConditionFailed),
            Err(e) => Err(io_error("create", &path, e)),
        }
    }

    async fn get(&self, table: &str, lock_id: &str) -> Result<Option<LockItem>, TransportError> {
        let path = self.row_path(table, lock_id);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };

        serde_json::from_slice(&content).map(Some).map_err(|e| {
            TransportError::service(format!("Corrupt lock row {}: {}", path.display(), e))
        })
    }

    async fn delete(&self, table: &str, lock_id: &str) -> Result<(), TransportError> {
        remove_if_exists(&self.row_path(table, lock_id)).await
    }
}

/// Lock ids are resource paths; keep them to a single file name
fn encode_lock_id(lock_id: &str) -> String {
    lock_id.replace('%', "%25").replace('/', "%2F")
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

async fn create_parent(path: &Path) -> Result<(), TransportError> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error("create directory", parent, e)),
        None => Ok(()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), TransportError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("remove", path, e)),
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> TransportError {
    TransportError::service(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_object_store_read_write() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        assert_eq!(
            store.get("state", "env/prod.json").await.unwrap_err(),
            TransportError::NotFound
        );

        store
            .put(PutObject {
                bucket: "state",
                key: "env/prod.json",
                body: b"{}".to_vec(),
                content_type: "application/json",
                encryption: None,
                acl: None,
            })
            .await
            .unwrap();

        assert_eq!(store.get("state", "env/prod.json").await.unwrap(), b"{}");
        assert!(dir.path().join("state/env/prod.json").exists());
    }

    #[tokio::test]
    async fn test_local_object_store_failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        // A non-empty directory at the target makes the rename fail
        std::fs::create_dir_all(dir.path().join("state/prod.json/inner")).unwrap();

        let err = store
            .put(PutObject {
                bucket: "state",
                key: "prod.json",
                body: b"{}".to_vec(),
                content_type: "application/json",
                encryption: None,
                acl: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Service(ref m) if m.contains("rename")));

        let names: Vec<String> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["prod.json".to_string()]);
    }

    #[tokio::test]
    async fn test_local_object_store_delete_missing() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.delete("state", "never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_lock_table() {
        let dir = tempdir().unwrap();
        let table = LocalLockTable::new(dir.path());
        let item = LockItem {
            lock_id: "state/env/prod.json".into(),
            info: "{\"ID\":\"1\"}".into(),
        };

        table.put_if_absent("locks", item.clone()).await.unwrap();
        let second = LockItem {
            info: "{\"ID\":\"2\"}".into(),
            ..item.clone()
        };
        assert_eq!(
            table.put_if_absent("locks", second).await.unwrap_err(),
            TransportError::ConditionFailed
        );

        assert_eq!(
            table.get("locks", "state/env/prod.json").await.unwrap(),
            Some(item)
        );
        assert!(
            dir.path()
                .join("locks")
                .join("state%2Fenv%2Fprod.json")
                .exists()
        );

        table.delete("locks", "state/env/prod.json").await.unwrap();
        table.delete("locks", "state/env/prod.json").await.unwrap();
        assert_eq!(table.get("locks", "state/env/prod.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_lock_table_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let table = LocalLockTable::new(dir.path());
        let item = LockItem {
            lock_id: "a/b".into(),
            info: String::new(),
        };
        table.put_if_absent("locks", item.clone()).await.unwrap();
        let _ = table.put_if_absent("locks", item).await;

        let entries = std::fs::read_dir(dir.path().join("locks")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_encode_lock_id() {
        assert_eq!(encode_lock_id("bucket/key"), "bucket%2Fkey");
        assert_eq!(encode_lock_id("a%2Fb"), "a%252Fb");
    }
}
