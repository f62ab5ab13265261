use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The resolved extraction plan: which binaries to pull out of which images,
/// grouped by network. Parsed from the YAML configuration document and
/// immutable for the duration of a poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPlan {
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
    pub docker_image: String,
    pub docker_image_version: String,
    /// Comma-separated absolute paths inside the image filesystem.
    pub binary_paths: String,
}

impl ImageSpec {
    /// Full image reference, e.g. `ethereum/client-go:latest`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.docker_image, self.docker_image_version)
    }

    /// The configured paths, trimmed, empty entries dropped.
    pub fn paths(&self) -> Vec<&str> {
        self.binary_paths
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .collect()
    }
}

impl ExtractionPlan {
    /// Parse and validate a plan document. A document that fails validation
    /// is rejected wholesale; callers keep operating on their previous plan.
    pub fn parse(document: &str) -> Result<Self, AppError> {
        let plan: ExtractionPlan = serde_yaml::from_str(document)?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for network in &self.networks {
            if network.name.trim().is_empty() {
                return Err(AppError::Plan("network with an empty name".to_string()));
            }
            if !seen.insert(network.name.as_str()) {
                return Err(AppError::Plan(format!(
                    "duplicate network name: {}",
                    network.name
                )));
            }
            for image in &network.images {
                if image.docker_image.trim().is_empty() {
                    return Err(AppError::Plan(format!(
                        "network {} contains an image without a reference",
                        network.name
                    )));
                }
                if image.docker_image_version.trim().is_empty() {
                    return Err(AppError::Plan(format!(
                        "image {} has an empty version tag",
                        image.docker_image
                    )));
                }
            }
        }
        Ok(())
    }
}
