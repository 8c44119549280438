//! The shared blob bucket, consumed as an opaque store keyed by an id the
//! caller never interprets — used for fill-form/geometry screenshots.

use std::path::PathBuf;

use async_trait::async_trait;
use lockbox_domain::{Error, Result};
use uuid::Uuid;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn insert(&self, bytes: Vec<u8>) -> Result<String>;
    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(Error::Other(format!("invalid blob id {id:?}")));
        }
        Ok(self.dir.join(id))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn insert(&self, bytes: Vec<u8>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let path = self.path_for(&id)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&path, bytes)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        Ok(id)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(id)?;
        let result = tokio::task::spawn_blocking(move || std::fs::read(path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        let result = tokio::task::spawn_blocking(move || std::fs::remove_file(path)).await.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        match result {
            Ok(()) | Err(_) => Ok(()), // deleting an already-absent blob is not an error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let id = store.insert(b"hello".to_vec()).await.unwrap();
        assert_eq!(store.fetch(&id).await.unwrap(), Some(b"hello".to_vec()));
        store.delete(&id).await.unwrap();
        assert_eq!(store.fetch(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetching_missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert_eq!(store.fetch("00000000-0000-0000-0000-000000000000").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_path_traversal_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.fetch("../../etc/passwd").await.is_err());
    }
}
