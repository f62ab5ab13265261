use bytes::Bytes;
use chrono::Utc;
use futures::stream::BoxStream;
use tracing::info;

use crate::error::AppError;
use crate::storage::store::StorageManager;
use crate::storage::types::binary_version::{BinaryVersion, GLOBAL_INDEX};

/// Attributes of a binary observed during extraction, before a record for
/// it exists.
#[derive(Debug, Clone)]
pub struct NewBinaryVersion {
    pub network: String,
    pub docker_image: String,
    pub docker_version: String,
    pub original_path: String,
}

/// Content-addressed archive of extracted binaries.
///
/// Layout: one directory per network, one sub-directory per content hash
/// holding exactly one blob and one version record, plus a global
/// `metadata.json` index listing every committed version. The index commit
/// is the last step of a `put`, so readers of the index only ever see
/// versions whose blob and record are fully written. The index itself is
/// replaced atomically on every commit.
///
/// The extraction engine is the single writer; the web layer only reads.
#[derive(Clone)]
pub struct ContentStore {
    storage: StorageManager,
}

impl ContentStore {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Load the global index. A missing index means an empty archive.
    async fn load_index(&self) -> Result<Vec<BinaryVersion>, AppError> {
        match self.storage.get(GLOBAL_INDEX).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_index(&self, index: &[BinaryVersion]) -> Result<(), AppError> {
        let encoded = serde_json::to_vec_pretty(index)?;
        self.storage.put(GLOBAL_INDEX, Bytes::from(encoded)).await?;
        Ok(())
    }

    /// Whether a version with this content hash is already committed for
    /// the network.
    pub async fn has(&self, network: &str, sha256: &str) -> Result<bool, AppError> {
        let index = self.load_index().await?;
        Ok(index
            .iter()
            .any(|v| v.network == network && v.sha256 == sha256))
    }

    /// Persist extracted bytes as a new version.
    ///
    /// Idempotent: when a version with the same (network, content hash)
    /// already exists the existing record is returned and nothing is
    /// written. Write ordering within a new put: blob, then version record,
    /// then index commit.
    pub async fn put(
        &self,
        attrs: NewBinaryVersion,
        bytes: &[u8],
    ) -> Result<BinaryVersion, AppError> {
        let sha256 = BinaryVersion::digest(bytes);
        let mut index = self.load_index().await?;

        if let Some(existing) = index
            .iter()
            .find(|v| v.network == attrs.network && v.sha256 == sha256)
        {
            return Ok(existing.clone());
        }

        let record = BinaryVersion {
            binary_name: BinaryVersion::binary_name_from_path(&attrs.original_path),
            network: attrs.network,
            sha256,
            docker_image: attrs.docker_image,
            docker_version: attrs.docker_version,
            original_path: attrs.original_path,
            size_bytes: bytes.len() as u64,
            extraction_date: Utc::now(),
        };

        self.storage
            .put(&record.blob_location(), Bytes::copy_from_slice(bytes))
            .await?;
        let encoded = serde_json::to_vec_pretty(&record)?;
        self.storage
            .put(&record.record_location(), Bytes::from(encoded))
            .await?;

        index.push(record.clone());
        self.commit_index(&index).await?;

        info!(
            network = %record.network,
            binary = %record.binary_name,
            sha256 = %record.sha256,
            size_bytes = record.size_bytes,
            "stored new binary version"
        );
        Ok(record)
    }

    /// All committed versions, optionally filtered, newest first.
    pub async fn list(
        &self,
        network: Option<&str>,
        binary_name: Option<&str>,
        docker_image: Option<&str>,
    ) -> Result<Vec<BinaryVersion>, AppError> {
        let mut versions = self.load_index().await?;
        versions.retain(|v| {
            network.is_none_or(|n| v.network == n)
                && binary_name.is_none_or(|b| v.binary_name == b)
                && docker_image.is_none_or(|i| v.docker_image == i)
        });
        versions.sort_by(|a, b| b.extraction_date.cmp(&a.extraction_date));
        Ok(versions)
    }

    /// Distinct network names present in the archive, sorted.
    pub async fn networks(&self) -> Result<Vec<String>, AppError> {
        let index = self.load_index().await?;
        let mut names: Vec<String> = index.into_iter().map(|v| v.network).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// The newest committed version of a binary name within a network.
    pub async fn latest(
        &self,
        network: &str,
        binary_name: &str,
    ) -> Result<Option<BinaryVersion>, AppError> {
        Ok(self
            .list(Some(network), Some(binary_name), None)
            .await?
            .into_iter()
            .next())
    }

    /// Look up one version by its content hash.
    pub async fn find(
        &self,
        network: &str,
        sha256: &str,
    ) -> Result<Option<BinaryVersion>, AppError> {
        let index = self.load_index().await?;
        Ok(index
            .into_iter()
            .find(|v| v.network == network && v.sha256 == sha256))
    }

    /// Every version extracted from one (network, image, version tag).
    pub async fn versions_for_image(
        &self,
        network: &str,
        docker_image: &str,
        docker_version: &str,
    ) -> Result<Vec<BinaryVersion>, AppError> {
        let mut versions = self.list(Some(network), None, Some(docker_image)).await?;
        versions.retain(|v| v.docker_version == docker_version);
        Ok(versions)
    }

    /// Full blob contents for a committed version.
    pub async fn get_bytes(&self, version: &BinaryVersion) -> Result<Bytes, AppError> {
        Ok(self.storage.get(&version.blob_location()).await?)
    }

    /// Streaming blob contents for download responses.
    pub async fn get_stream(
        &self,
        version: &BinaryVersion,
    ) -> Result<BoxStream<'static, object_store::Result<Bytes>>, AppError> {
        Ok(self.storage.get_stream(&version.blob_location()).await?)
    }
}
