use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Location of the global metadata index inside the archive.
pub const GLOBAL_INDEX: &str = "metadata.json";

/// Name of the per-version metadata record inside a version directory.
pub const VERSION_RECORD: &str = "metadata.json";

/// One immutable version of an extracted binary.
///
/// The sha256 digest of the extracted bytes is the primary key within a
/// network: extracting identical bytes twice resolves to the same record
/// and stores nothing new. Records are created once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinaryVersion {
    pub network: String,
    pub sha256: String,
    pub docker_image: String,
    pub docker_version: String,
    pub original_path: String,
    pub size_bytes: u64,
    pub extraction_date: DateTime<Utc>,
    pub binary_name: String,
}

impl BinaryVersion {
    /// Hex-encoded sha256 digest of the given bytes.
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// File name component of an in-image path, sanitized for storage.
    pub fn binary_name_from_path(path: &str) -> String {
        let name = path.rsplit('/').next().unwrap_or(path);
        Self::sanitize_file_name(name)
    }

    /// Sanitizes a file name to prevent directory traversal. Replaces any
    /// non-alphanumeric characters (excluding '.', '-' and '_') with
    /// underscores.
    pub fn sanitize_file_name(file_name: &str) -> String {
        file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// A clean filename for downloads: `{binary_name}_{version}` with
    /// colons in the version tag replaced.
    pub fn download_file_name(&self) -> String {
        let clean_version = self.docker_version.replace(':', "_");
        format!("{}_{}", self.binary_name, clean_version)
    }

    /// Storage location of the version directory for a (network, hash).
    pub fn version_dir(network: &str, sha256: &str) -> String {
        format!("{network}/{sha256}")
    }

    /// Storage location of the per-version metadata record.
    pub fn record_location_for(network: &str, sha256: &str) -> String {
        format!("{}/{VERSION_RECORD}", Self::version_dir(network, sha256))
    }

    /// Storage location of this version's metadata record.
    pub fn record_location(&self) -> String {
        Self::record_location_for(&self.network, &self.sha256)
    }

    /// Storage location of this version's blob.
    pub fn blob_location(&self) -> String {
        format!(
            "{}/{}",
            Self::version_dir(&self.network, &self.sha256),
            self.binary_name
        )
    }
}
