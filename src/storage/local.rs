use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::{BlobStore, StorageError};

/// Blobs as flat files under one directory.
///
/// Writes go to a temporary sibling, are fsynced, then renamed over the
/// target, so a crash mid-write leaves the previous bytes intact.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(LocalBlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for LocalBlobStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = self
            .root
            .join(format!(".{key}.{:016x}.tmp", rand::random::<u64>()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                log::debug!("Could not remove temp file {}: {cleanup}", tmp.display());
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(dir.path()).await.unwrap();

        store.write("doc_a.pdf", b"first").await.unwrap();
        store.write("doc_a.pdf", b"second").await.unwrap();
        assert_eq!(store.read("doc_a.pdf").await.unwrap(), b"second");

        // No temp files left behind.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["doc_a.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(dir.path()).await.unwrap();

        store.write("doc_b.pdf", b"bytes").await.unwrap();
        store.delete("doc_b.pdf").await.unwrap();
        assert!(matches!(store.read("doc_b.pdf").await, Err(StorageError::NotFound(_))));
        store.delete("doc_b.pdf").await.unwrap();
        assert!(matches!(store.delete("../doc_b.pdf").await, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(dir.path()).await.unwrap();
        assert!(matches!(store.read("nope.pdf").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(dir.path()).await.unwrap();
        for key in ["../escape.pdf", "a/b.pdf", ".hidden", ""] {
            assert!(matches!(
                store.write(key, b"x").await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }
}
