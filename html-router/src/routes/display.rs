use chrono::{DateTime, Utc};
use serde::Serialize;

use common::storage::types::binary_version::BinaryVersion;

/// Template-facing view of a version record with preformatted fields.
#[derive(Serialize)]
pub struct DisplayVersion {
    pub network: String,
    pub sha256: String,
    pub short_hash: String,
    pub docker_image: String,
    pub docker_version: String,
    pub original_path: String,
    pub size_bytes: u64,
    pub extraction_date: String,
    pub binary_name: String,
}

impl DisplayVersion {
    pub fn format_date(date: DateTime<Utc>) -> String {
        date.format("%Y-%m-%d %H:%M UTC").to_string()
    }
}

impl From<BinaryVersion> for DisplayVersion {
    fn from(version: BinaryVersion) -> Self {
        Self {
            short_hash: version.sha256.chars().take(12).collect(),
            extraction_date: Self::format_date(version.extraction_date),
            network: version.network,
            sha256: version.sha256,
            docker_image: version.docker_image,
            docker_version: version.docker_version,
            original_path: version.original_path,
            size_bytes: version.size_bytes,
            binary_name: version.binary_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_a_prefix() {
        let version = BinaryVersion {
            network: "ethereum".into(),
            sha256: "2cf24dba5fb0a30e26e83b2ac5b9e29e".into(),
            docker_image: "ethereum/client-go".into(),
            docker_version: "latest".into(),
            original_path: "/usr/local/bin/geth".into(),
            size_bytes: 1,
            extraction_date: Utc::now(),
            binary_name: "geth".into(),
        };
        let display = DisplayVersion::from(version);
        assert_eq!(display.short_hash, "2cf24dba5fb0");
    }
}
