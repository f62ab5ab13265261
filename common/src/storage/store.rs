use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Storage backend for the binary archive.
///
/// Wraps an `object_store` backend (local filesystem in production, memory
/// in tests). Writes on the local backend are staged and published with an
/// atomic rename, so a concurrent reader never observes a partially written
/// blob or metadata document.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    /// Create a storage manager for the configured backend, creating the
    /// base directory for local storage when missing.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self { store, local_base })
    }

    /// The resolved base directory when using the local backend.
    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    /// Store bytes at the given location. The write is published atomically.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve the full contents at the given location.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Streaming handle for large blobs, suitable for download responses.
    pub async fn get_stream(
        &self,
        location: &str,
    ) -> object_store::Result<BoxStream<'static, object_store::Result<Bytes>>> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream())
    }

    /// List all objects below the given prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }

    /// Check whether an object exists at the given location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
    }
}

/// Resolve the absolute base directory for local storage from config.
///
/// A relative `data_dir` is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use uuid::Uuid;

    fn memory_config() -> AppConfig {
        AppConfig {
            storage: StorageKind::Memory,
            ..AppConfig::default()
        }
    }

    fn local_config(root: &str) -> AppConfig {
        AppConfig {
            data_dir: root.into(),
            storage: StorageKind::Local,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn memory_put_get_exists() {
        let storage = StorageManager::new(&memory_config())
            .await
            .expect("create storage manager");
        assert!(storage.local_base_path().is_none());

        let location = "ethereum/abc123/geth";
        let data = b"binary bytes";

        storage
            .put(location, Bytes::from(data.to_vec()))
            .await
            .expect("put");
        let retrieved = storage.get(location).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);
        assert!(storage.exists(location).await.expect("exists"));
        assert!(!storage.exists("ethereum/missing").await.expect("exists"));
    }

    #[tokio::test]
    async fn local_round_trip_and_layout() {
        let base = format!("/tmp/utdrag_store_test_{}", Uuid::new_v4());
        let storage = StorageManager::new(&local_config(&base))
            .await
            .expect("create storage manager");
        let resolved_base = storage
            .local_base_path()
            .expect("resolved base dir")
            .to_path_buf();
        assert_eq!(resolved_base, PathBuf::from(&base));

        let location = "ethereum/abc123/geth";
        let data = b"local binary bytes";

        storage
            .put(location, Bytes::from(data.to_vec()))
            .await
            .expect("put");
        let retrieved = storage.get(location).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);

        // Layout: one directory per network, one per content hash.
        let version_dir = resolved_base.join("ethereum/abc123");
        tokio::fs::metadata(&version_dir)
            .await
            .expect("version directory exists after write");

        let _ = tokio::fs::remove_dir_all(&base).await;
    }

    #[tokio::test]
    async fn list_with_prefix() {
        let storage = StorageManager::new(&memory_config())
            .await
            .expect("create storage manager");

        for (location, data) in [
            ("ethereum/h1/geth", b"a".as_ref()),
            ("ethereum/h2/geth", b"b".as_ref()),
            ("optimism/h3/op-node", b"c".as_ref()),
        ] {
            storage
                .put(location, Bytes::from(data.to_vec()))
                .await
                .expect("put");
        }

        let all = storage.list(None).await.expect("list all");
        assert_eq!(all.len(), 3);

        let ethereum = storage.list(Some("ethereum/")).await.expect("list prefix");
        assert_eq!(ethereum.len(), 2);

        let none = storage.list(Some("unknown/")).await.expect("list missing");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn stream_matches_put_contents() {
        use futures::StreamExt;

        let storage = StorageManager::new(&memory_config())
            .await
            .expect("create storage manager");

        let location = "ethereum/h1/geth";
        let content = vec![42u8; 1024 * 64];
        storage
            .put(location, Bytes::from(content.clone()))
            .await
            .expect("put");

        let mut stream = storage.get_stream(location).await.expect("stream");
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.expect("chunk"));
        }
        assert_eq!(collected, content);
    }
}
