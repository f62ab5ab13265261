use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use common::error::AppError;
use common::plan::{ExtractionPlan, ImageSpec};
use common::storage::content_store::{ContentStore, NewBinaryVersion};
use common::storage::types::binary_version::BinaryVersion;

use crate::runtime::{ContainerRuntime, ImageHandle, RuntimeError};

/// Outcome of extracting one configured path.
#[derive(Debug)]
pub enum PathOutcome {
    /// New content, persisted as a fresh version.
    Stored(BinaryVersion),
    /// Content already known to the store for this network.
    AlreadyKnown { sha256: String },
    /// The path could not be extracted; siblings are unaffected.
    Failed { reason: String },
}

/// Per-image summary of an extraction, for operator-facing logging.
#[derive(Debug)]
pub struct ImageReport {
    pub network: String,
    pub reference: String,
    pub outcomes: Vec<(String, PathOutcome)>,
}

impl ImageReport {
    fn new(network: &str, reference: String) -> Self {
        Self {
            network: network.to_string(),
            reference,
            outcomes: Vec::new(),
        }
    }

    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PathOutcome::Stored(_)))
            .count()
    }

    pub fn already_known(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PathOutcome::AlreadyKnown { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PathOutcome::Failed { .. }))
            .count()
    }
}

/// Aggregate of one full pass over the plan.
#[derive(Debug, Default)]
pub struct PassReport {
    pub images: Vec<ImageReport>,
}

impl PassReport {
    pub fn stored(&self) -> usize {
        self.images.iter().map(ImageReport::stored).sum()
    }

    pub fn already_known(&self) -> usize {
        self.images.iter().map(ImageReport::already_known).sum()
    }

    pub fn failed(&self) -> usize {
        self.images.iter().map(ImageReport::failed).sum()
    }
}

/// Walks the extraction plan, pulls each image and feeds extracted bytes
/// into the content store. Pull and path failures are absorbed into the
/// report; only content store failures are returned as errors, which abort
/// the pass.
pub struct ExtractionEngine {
    store: ContentStore,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ExtractionEngine {
    pub fn new(store: ContentStore, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { store, runtime }
    }

    /// One sequential pass over every network × image in the plan.
    pub async fn run_pass(&self, plan: &ExtractionPlan) -> Result<PassReport, AppError> {
        let mut processed = HashSet::new();
        let mut report = PassReport::default();

        for network in &plan.networks {
            for image in &network.images {
                let image_report = self
                    .extract_image(&network.name, image, &mut processed)
                    .await?;
                report.images.push(image_report);
            }
        }

        info!(
            images = report.images.len(),
            stored = report.stored(),
            already_known = report.already_known(),
            failed = report.failed(),
            "extraction pass finished"
        );
        Ok(report)
    }

    /// Extract every configured path of one image. A failed pull skips the
    /// image for this pass without failing the pass.
    pub async fn extract_image(
        &self,
        network: &str,
        spec: &ImageSpec,
        processed: &mut HashSet<String>,
    ) -> Result<ImageReport, AppError> {
        let reference = spec.reference();
        let mut report = ImageReport::new(network, reference.clone());

        let handle = match self.runtime.pull(&reference).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(
                    network = %network,
                    image = %reference,
                    error = %err,
                    "image pull failed; skipping for this pass"
                );
                for path in spec.paths() {
                    report.outcomes.push((
                        path.to_string(),
                        PathOutcome::Failed {
                            reason: format!("image pull failed: {err}"),
                        },
                    ));
                }
                return Ok(report);
            }
        };

        // Release the container even when a store failure aborts the pass.
        let result = self
            .extract_paths(network, spec, &handle, processed, &mut report)
            .await;
        self.runtime.release(handle).await;
        result?;

        info!(
            network = %network,
            image = %reference,
            stored = report.stored(),
            already_known = report.already_known(),
            failed = report.failed(),
            "image extraction finished"
        );
        Ok(report)
    }

    async fn extract_paths(
        &self,
        network: &str,
        spec: &ImageSpec,
        handle: &ImageHandle,
        processed: &mut HashSet<String>,
        report: &mut ImageReport,
    ) -> Result<(), AppError> {
        for path in spec.paths() {
            let key = format!("{network}:{}:{path}", spec.reference());
            if !processed.insert(key) {
                debug!(network = %network, path = %path, "already processed in this pass");
                continue;
            }

            let bytes = match self.runtime.copy_file(handle, path).await {
                Ok(bytes) => bytes,
                Err(RuntimeError::NotFound(_)) => {
                    warn!(
                        network = %network,
                        image = %handle.reference,
                        path = %path,
                        "path not found in image"
                    );
                    report.outcomes.push((
                        path.to_string(),
                        PathOutcome::Failed {
                            reason: "path not found in image".to_string(),
                        },
                    ));
                    continue;
                }
                Err(err) => {
                    warn!(
                        network = %network,
                        image = %handle.reference,
                        path = %path,
                        error = %err,
                        "path extraction failed"
                    );
                    report.outcomes.push((
                        path.to_string(),
                        PathOutcome::Failed {
                            reason: err.to_string(),
                        },
                    ));
                    continue;
                }
            };

            // Store failures are fatal to the pass, hence the `?`.
            let sha256 = BinaryVersion::digest(&bytes);
            if self.store.has(network, &sha256).await? {
                debug!(
                    network = %network,
                    path = %path,
                    sha256 = %sha256,
                    "content already known"
                );
                report
                    .outcomes
                    .push((path.to_string(), PathOutcome::AlreadyKnown { sha256 }));
                continue;
            }

            let record = self
                .store
                .put(
                    NewBinaryVersion {
                        network: network.to_string(),
                        docker_image: spec.docker_image.clone(),
                        docker_version: spec.docker_image_version.clone(),
                        original_path: path.to_string(),
                    },
                    &bytes,
                )
                .await?;
            report
                .outcomes
                .push((path.to_string(), PathOutcome::Stored(record)));
        }
        Ok(())
    }
}
