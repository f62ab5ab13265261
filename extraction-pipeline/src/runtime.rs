use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Errors from the container runtime capability. Everything here is
/// isolated per image or per path by the extraction engine; nothing in
/// this module aborts a pass.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("image pull failed: {0}")]
    Pull(String),
    #[error("container setup failed: {0}")]
    Container(String),
    #[error("path not found in image: {0}")]
    NotFound(String),
    #[error("runtime call timed out after {0:?}")]
    Timeout(Duration),
    #[error("runtime io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pulled image, materialized as an ephemeral container so files can be
/// copied out of its filesystem.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub reference: String,
    container_id: String,
}

/// The container runtime as the extraction engine sees it: pull an image,
/// copy files out, release. Implemented by the docker CLI in production
/// and by an in-memory stub in tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull(&self, reference: &str) -> Result<ImageHandle, RuntimeError>;
    async fn copy_file(&self, handle: &ImageHandle, path: &str) -> Result<Vec<u8>, RuntimeError>;
    /// Best-effort cleanup of the ephemeral container.
    async fn release(&self, handle: ImageHandle);
}

/// Container runtime backed by the `docker` command line client.
pub struct DockerCli {
    platform: Option<String>,
    call_timeout: Duration,
}

impl DockerCli {
    /// Platform forced onto pulls when the platform toggle is enabled.
    pub const DEFAULT_PLATFORM: &'static str = "linux/amd64";

    pub fn new(platform_support: bool, call_timeout: Duration) -> Self {
        Self {
            platform: platform_support.then(|| Self::DEFAULT_PLATFORM.to_string()),
            call_timeout,
        }
    }

    /// Run one docker CLI call, bounded by the configured timeout.
    async fn run(&self, args: &[String]) -> Result<std::process::Output, RuntimeError> {
        debug!(command = %format!("docker {}", args.join(" ")), "runtime call");
        let invocation = Command::new("docker").args(args).output();
        match timeout(self.call_timeout, invocation).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(RuntimeError::Timeout(self.call_timeout)),
        }
    }

    fn platform_arg(&self) -> Option<String> {
        self.platform
            .as_ref()
            .map(|platform| format!("--platform={platform}"))
    }
}

fn stderr_excerpt(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.lines().next().unwrap_or("unknown error").to_string()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn pull(&self, reference: &str) -> Result<ImageHandle, RuntimeError> {
        let mut pull_args = vec!["pull".to_string()];
        if let Some(platform) = self.platform_arg() {
            pull_args.push(platform);
        }
        pull_args.push(reference.to_string());

        let output = self.run(&pull_args).await?;
        if !output.status.success() {
            return Err(RuntimeError::Pull(stderr_excerpt(&output)));
        }

        // An ephemeral container exposes the image filesystem to `docker cp`.
        let mut create_args = vec!["create".to_string()];
        if let Some(platform) = self.platform_arg() {
            create_args.push(platform);
        }
        create_args.push(reference.to_string());

        let output = self.run(&create_args).await?;
        if !output.status.success() {
            return Err(RuntimeError::Container(stderr_excerpt(&output)));
        }
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(RuntimeError::Container(
                "docker create returned no container id".to_string(),
            ));
        }

        Ok(ImageHandle {
            reference: reference.to_string(),
            container_id,
        })
    }

    async fn copy_file(&self, handle: &ImageHandle, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let scratch = tempfile::tempdir()?;
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let target = scratch.path().join(file_name);
        let source = format!("{}:{}", handle.container_id, path);

        let args = vec![
            "cp".to_string(),
            source,
            target.to_string_lossy().into_owned(),
        ];
        let output = self.run(&args).await?;
        if !output.status.success() {
            let stderr = stderr_excerpt(&output);
            // The CLI phrases missing paths a few different ways depending
            // on version ("No such container:path", "Could not find the
            // file ...").
            if stderr.contains("No such") || stderr.contains("Could not find") {
                return Err(RuntimeError::NotFound(path.to_string()));
            }
            return Err(RuntimeError::Container(stderr));
        }

        Ok(tokio::fs::read(&target).await?)
    }

    async fn release(&self, handle: ImageHandle) {
        let args = vec!["rm".to_string(), handle.container_id.clone()];
        match self.run(&args).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => warn!(
                container = %handle.container_id,
                error = %stderr_excerpt(&output),
                "failed to remove container"
            ),
            Err(err) => warn!(
                container = %handle.container_id,
                error = %err,
                "failed to remove container"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory runtime for tests: images are maps from in-image path to
    /// file contents. Unknown images fail to pull, unknown paths report
    /// `NotFound`.
    #[derive(Default)]
    pub struct StubRuntime {
        images: HashMap<String, HashMap<String, Vec<u8>>>,
        pulls: AtomicUsize,
    }

    impl StubRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(
            mut self,
            reference: &str,
            path: &str,
            contents: &[u8],
        ) -> Self {
            self.images
                .entry(reference.to_string())
                .or_default()
                .insert(path.to_string(), contents.to_vec());
            self
        }

        pub fn pull_count(&self) -> usize {
            self.pulls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContainerRuntime for StubRuntime {
        async fn pull(&self, reference: &str) -> Result<ImageHandle, RuntimeError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if !self.images.contains_key(reference) {
                return Err(RuntimeError::Pull(format!(
                    "manifest unknown: {reference}"
                )));
            }
            Ok(ImageHandle {
                reference: reference.to_string(),
                container_id: format!("stub-{reference}"),
            })
        }

        async fn copy_file(
            &self,
            handle: &ImageHandle,
            path: &str,
        ) -> Result<Vec<u8>, RuntimeError> {
            self.images
                .get(&handle.reference)
                .and_then(|files| files.get(path))
                .cloned()
                .ok_or_else(|| RuntimeError::NotFound(path.to_string()))
        }

        async fn release(&self, _handle: ImageHandle) {}
    }
}
