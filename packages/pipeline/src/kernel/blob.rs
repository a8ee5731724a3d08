//! Filesystem-backed blob storage.
//!
//! The default [`BaseBlobStorage`] implementation: blobs live as files
//! under a root directory, addressed by the relative path returned from
//! `upload`. Deployments backed by an object store swap in their own
//! implementation of the trait.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::traits::BaseBlobStorage;
use crate::error::PipelineError;

pub struct FsBlobStorage {
    root: PathBuf,
}

impl FsBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a blob path under the root, rejecting traversal segments.
    fn resolve(&self, path: &str) -> Result<PathBuf, PipelineError> {
        let relative = Path::new(path);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if traversal {
            return Err(PipelineError::BlobUnavailable {
                path: path.to_string(),
                detail: "path escapes storage root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BaseBlobStorage for FsBlobStorage {
    async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        let safe_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let blob_path = format!("{}_{}", Uuid::new_v4(), safe_name);
        let full_path = self.resolve(&blob_path)?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PipelineError::BlobUnavailable {
                path: blob_path.clone(),
                detail: e.to_string(),
            })?;
        fs::write(&full_path, bytes)
            .await
            .map_err(|e| PipelineError::BlobUnavailable {
                path: blob_path.clone(),
                detail: e.to_string(),
            })?;

        Ok(blob_path)
    }

    async fn download_bytes(&self, path: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let full_path = self.resolve(path)?;
        match fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::BlobUnavailable {
                path: path.to_string(),
                detail: e.to_string(),
            }),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), PipelineError> {
        let full_path = self.resolve(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::BlobUnavailable {
                path: path.to_string(),
                detail: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> FsBlobStorage {
        let dir = std::env::temp_dir().join(format!("blob-test-{}", Uuid::new_v4()));
        FsBlobStorage::new(dir)
    }

    #[tokio::test]
    async fn upload_download_delete_round_trip() {
        let storage = temp_storage();
        let path = storage.upload("essay.txt", b"some text").await.unwrap();

        let bytes = storage.download_bytes(&path).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"some text"[..]));

        storage.delete(&path).await.unwrap();
        assert!(storage.download_bytes(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_blob_is_none_not_error() {
        let storage = temp_storage();
        assert!(storage.download_bytes("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_missing_blob_is_ok() {
        let storage = temp_storage();
        storage.delete("nope.txt").await.unwrap();
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let storage = temp_storage();
        let err = storage.download_bytes("../etc/passwd").await;
        assert!(err.is_err());
    }
}
