use std::path::{Path, PathBuf};

use async_trait::async_trait;
use matchup_models::ArtifactBundle;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::artifact_store::{decode_artifact, encode_artifact, ArtifactStore, StoreError};

const ARTIFACT_EXTENSION: &str = "artifact";

/// One `{key}.artifact` file per matchup under a root directory.
///
/// Writes go to a hidden temporary file in the same directory, are fsynced and
/// then renamed over the target, so readers only ever see a complete blob.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| StoreError::Io {
            op: "create_dir",
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{ARTIFACT_EXTENSION}"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.{}.tmp", Uuid::new_v4()))
    }

    async fn write_temp(&self, tmp: &Path, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let io_err = |op: &'static str| {
            let key = key.to_string();
            move |source| StoreError::Io { op, key, source }
        };

        let mut file = fs::File::create(tmp).await.map_err(io_err("create"))?;
        file.write_all(bytes).await.map_err(io_err("write"))?;
        file.sync_all().await.map_err(io_err("fsync"))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn get(&self, key: &str) -> Result<Option<ArtifactBundle>, StoreError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    op: "read",
                    key: key.to_string(),
                    source,
                })
            }
        };
        decode_artifact(key, &bytes).map(Some)
    }

    async fn put(&self, key: &str, bundle: &ArtifactBundle) -> Result<(), StoreError> {
        let bytes = encode_artifact(key, bundle)?;
        let tmp = self.temp_path_for(key);

        let written = match self.write_temp(&tmp, key, &bytes).await {
            Ok(()) => fs::rename(&tmp, self.path_for(key))
                .await
                .map_err(|source| StoreError::Io {
                    op: "rename",
                    key: key.to_string(),
                    source,
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(key, error = %cleanup, "Failed to remove temporary artifact file");
                }
            }
            return Err(e);
        }

        debug!(key, bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                op: "remove",
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let list_err = |source| StoreError::Io {
            op: "list",
            key: self.root.display().to_string(),
            source,
        };

        let mut entries = fs::read_dir(&self.root).await.map_err(list_err)?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::test_support::sample_bundle;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("matchup-store-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = FileArtifactStore::open(scratch_dir()).await.unwrap();
        assert!(store.get("laliga_x").await.unwrap().is_none());

        let bundle = sample_bundle("laliga_x");
        store.put("laliga_x", &bundle).await.unwrap();
        assert_eq!(store.get("laliga_x").await.unwrap(), Some(bundle));
        assert_eq!(store.keys().await.unwrap(), vec!["laliga_x".to_string()]);

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let store = FileArtifactStore::open(scratch_dir()).await.unwrap();
        let mut bundle = sample_bundle("k");
        store.put("k", &bundle).await.unwrap();
        bundle.match_count = 9;
        store.put("k", &bundle).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().unwrap().match_count, 9);
        let names: Vec<String> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.artifact".to_string()]);

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_unreadable() {
        let store = FileArtifactStore::open(scratch_dir()).await.unwrap();
        std::fs::write(store.path_for("k"), b"\x01\x00").unwrap();
        let err = store.get("k").await.unwrap_err();
        assert!(err.is_unreadable());

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = FileArtifactStore::open(scratch_dir()).await.unwrap();
        store.put("k", &sample_bundle("k")).await.unwrap();
        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(store.root());
    }
}
