use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::{header, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use url::Url;

use common::error::AppError;
use common::plan::ExtractionPlan;
use common::utils::config::AppConfig;

const CACHE_DOCUMENT: &str = "config.cache.yaml";
const CACHE_TOKEN: &str = "config.cache.etag";

/// Where the extraction plan document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSource {
    /// A file on the local filesystem.
    Local(PathBuf),
    /// A document fetched over HTTP, already resolved to its final URL.
    Remote(String),
}

/// A successfully resolved plan plus the change token it was fetched with.
/// If the token is unchanged on the next resolution, the snapshot is reused
/// verbatim and the document is not re-parsed.
#[derive(Debug, Clone)]
pub struct PlanSnapshot {
    pub plan: ExtractionPlan,
    pub token: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Resolution {
    Updated(PlanSnapshot),
    Unchanged,
}

/// Resolves the extraction plan from its configured source, with change
/// detection and a local cache of the last known-good remote document so a
/// restart can proceed while the remote source is unreachable.
pub struct PlanResolver {
    source: PlanSource,
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl PlanResolver {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AppError> {
        let source = if let Some(url) = cfg.config_path.strip_prefix('@') {
            info!(url = %url, "using direct URL plan source");
            PlanSource::Remote(url.to_string())
        } else if let Some(repo) = &cfg.config_repo {
            let raw_url = github_raw_url(repo)?;
            info!(repo = %repo, url = %raw_url, "using repository plan source");
            PlanSource::Remote(raw_url)
        } else {
            PlanSource::Local(PathBuf::from(&cfg.config_path))
        };

        Ok(Self {
            source,
            cache_dir: PathBuf::from(&cfg.data_dir),
            client: reqwest::Client::new(),
        })
    }

    pub fn source(&self) -> &PlanSource {
        &self.source
    }

    /// Resolve the current plan. `current` is the snapshot from the previous
    /// cycle, if any; an unchanged source short-circuits to
    /// `Resolution::Unchanged`. Errors leave the caller on its last good
    /// snapshot.
    pub async fn resolve(&self, current: Option<&PlanSnapshot>) -> Result<Resolution, AppError> {
        match &self.source {
            PlanSource::Local(path) => self.resolve_local(path, current).await,
            PlanSource::Remote(url) => self.resolve_remote(url, current).await,
        }
    }

    async fn resolve_local(
        &self,
        path: &Path,
        current: Option<&PlanSnapshot>,
    ) -> Result<Resolution, AppError> {
        let document = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Plan(format!("cannot read plan {}: {e}", path.display()))
        })?;
        let token = content_token(&document);
        if let Some(current) = current {
            if current.token.as_deref() == Some(token.as_str()) {
                return Ok(Resolution::Unchanged);
            }
        }

        let plan = ExtractionPlan::parse(&document)?;
        Ok(Resolution::Updated(PlanSnapshot {
            plan,
            token: Some(token),
            fetched_at: Utc::now(),
        }))
    }

    async fn resolve_remote(
        &self,
        url: &str,
        current: Option<&PlanSnapshot>,
    ) -> Result<Resolution, AppError> {
        // Prefer the in-memory token; fall back to the persisted one so a
        // fresh process still sends conditional requests.
        let known_token = match current.and_then(|s| s.token.clone()) {
            Some(token) => Some(token),
            None => self.stored_token().await,
        };

        let mut request = self.client.get(url);
        if let Some(token) = &known_token {
            request = request.header(header::IF_NONE_MATCH, token.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if current.is_none() => {
                warn!(error = %err, "plan fetch failed; trying the cached document");
                return self.resolve_from_cache().await.map(Resolution::Updated);
            }
            Err(err) => return Err(err.into()),
        };

        if response.status() == StatusCode::NOT_MODIFIED {
            if current.is_some() {
                return Ok(Resolution::Unchanged);
            }
            // Not modified, but nothing in memory yet: a restart with a
            // persisted token. The cached document is current.
            return self.resolve_from_cache().await.map(Resolution::Updated);
        }

        let response = response.error_for_status()?;
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let document = response.text().await?;

        // Sources without ETag support still get change detection through
        // the content digest.
        let token = etag.unwrap_or_else(|| content_token(&document));
        if let Some(current) = current {
            if current.token.as_deref() == Some(token.as_str()) {
                return Ok(Resolution::Unchanged);
            }
        }

        let plan = ExtractionPlan::parse(&document)?;
        self.persist_cache(&document, &token).await;
        info!(networks = plan.networks.len(), "fetched extraction plan");

        Ok(Resolution::Updated(PlanSnapshot {
            plan,
            token: Some(token),
            fetched_at: Utc::now(),
        }))
    }

    /// Rebuild a snapshot from the persisted copy of the last good fetch.
    async fn resolve_from_cache(&self) -> Result<PlanSnapshot, AppError> {
        let document = tokio::fs::read_to_string(self.cache_document_path())
            .await
            .map_err(|e| {
                AppError::Plan(format!("no cached plan document available: {e}"))
            })?;
        let plan = ExtractionPlan::parse(&document)?;
        let token = match self.stored_token().await {
            Some(token) => Some(token),
            None => Some(content_token(&document)),
        };
        Ok(PlanSnapshot {
            plan,
            token,
            fetched_at: Utc::now(),
        })
    }

    /// Persist the raw document and its token. Best effort: a failed cache
    /// write only costs restart resilience, not the current cycle.
    async fn persist_cache(&self, document: &str, token: &str) {
        if let Err(err) = tokio::fs::create_dir_all(&self.cache_dir).await {
            warn!(error = %err, "could not create plan cache directory");
            return;
        }
        if let Err(err) = tokio::fs::write(self.cache_document_path(), document).await {
            warn!(error = %err, "could not persist plan document");
            return;
        }
        if let Err(err) = tokio::fs::write(self.cache_token_path(), token).await {
            warn!(error = %err, "could not persist plan change token");
        }
    }

    async fn stored_token(&self) -> Option<String> {
        tokio::fs::read_to_string(self.cache_token_path())
            .await
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn cache_document_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_DOCUMENT)
    }

    fn cache_token_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_TOKEN)
    }
}

/// Change token for sources without ETags: digest of the document bytes.
fn content_token(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve a GitHub repository URL to the raw URL of its default-branch
/// `config.yaml`.
fn github_raw_url(repo_url: &str) -> Result<String, AppError> {
    let parsed = Url::parse(repo_url)
        .map_err(|e| AppError::Plan(format!("invalid repository URL {repo_url}: {e}")))?;
    if parsed.host_str() != Some("github.com") {
        return Err(AppError::Plan(format!(
            "unsupported repository host in {repo_url}"
        )));
    }
    let mut segments = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());
    let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
        return Err(AppError::Plan(format!(
            "repository URL {repo_url} is missing owner or name"
        )));
    };
    let repo = repo.trim_end_matches(".git");
    Ok(format!(
        "https://raw.githubusercontent.com/{owner}/{repo}/main/config.yaml"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const PLAN_DOC: &str = r#"
networks:
  - name: ethereum
    images:
      - docker_image: ethereum/client-go
        docker_image_version: latest
        binary_paths: /usr/local/bin/geth
"#;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("utdrag_resolver_{}", Uuid::new_v4()))
    }

    fn local_resolver(plan_path: &Path, cache_dir: &Path) -> PlanResolver {
        PlanResolver::from_config(&AppConfig {
            config_path: plan_path.to_string_lossy().into_owned(),
            data_dir: cache_dir.to_string_lossy().into_owned(),
            ..AppConfig::default()
        })
        .expect("resolver")
    }

    #[tokio::test]
    async fn local_source_updates_then_reports_unchanged() {
        let dir = scratch_dir();
        tokio::fs::create_dir_all(&dir).await.expect("scratch dir");
        let plan_path = dir.join("config.yaml");
        tokio::fs::write(&plan_path, PLAN_DOC).await.expect("write plan");

        let resolver = local_resolver(&plan_path, &dir);

        let first = resolver.resolve(None).await.expect("first resolve");
        let Resolution::Updated(snapshot) = first else {
            panic!("expected an updated snapshot");
        };
        assert_eq!(snapshot.plan.networks.len(), 1);

        let second = resolver.resolve(Some(&snapshot)).await.expect("second resolve");
        assert!(matches!(second, Resolution::Unchanged));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn local_source_detects_content_changes() {
        let dir = scratch_dir();
        tokio::fs::create_dir_all(&dir).await.expect("scratch dir");
        let plan_path = dir.join("config.yaml");
        tokio::fs::write(&plan_path, PLAN_DOC).await.expect("write plan");

        let resolver = local_resolver(&plan_path, &dir);
        let Resolution::Updated(snapshot) = resolver.resolve(None).await.expect("resolve") else {
            panic!("expected an updated snapshot");
        };

        let changed = PLAN_DOC.replace("ethereum", "gnosis");
        tokio::fs::write(&plan_path, changed).await.expect("rewrite plan");

        let next = resolver.resolve(Some(&snapshot)).await.expect("resolve");
        let Resolution::Updated(next) = next else {
            panic!("expected an updated snapshot after change");
        };
        assert_eq!(next.plan.networks[0].name, "gnosis");
        assert_ne!(next.token, snapshot.token);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn invalid_document_is_rejected() {
        let dir = scratch_dir();
        tokio::fs::create_dir_all(&dir).await.expect("scratch dir");
        let plan_path = dir.join("config.yaml");
        tokio::fs::write(&plan_path, "networks: [").await.expect("write plan");

        let resolver = local_resolver(&plan_path, &dir);
        assert!(resolver.resolve(None).await.is_err());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_local_document_is_a_plan_error() {
        let dir = scratch_dir();
        let resolver = local_resolver(&dir.join("absent.yaml"), &dir);
        assert!(matches!(
            resolver.resolve(None).await,
            Err(AppError::Plan(_))
        ));
    }

    #[tokio::test]
    async fn cached_document_restores_a_snapshot() {
        let dir = scratch_dir();
        let resolver = PlanResolver::from_config(&AppConfig {
            config_path: "@https://example.invalid/config.yaml".into(),
            data_dir: dir.to_string_lossy().into_owned(),
            ..AppConfig::default()
        })
        .expect("resolver");

        resolver.persist_cache(PLAN_DOC, "\"etag-1\"").await;

        let snapshot = resolver.resolve_from_cache().await.expect("cached snapshot");
        assert_eq!(snapshot.plan.networks[0].name, "ethereum");
        assert_eq!(snapshot.token.as_deref(), Some("\"etag-1\""));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn direct_url_and_repo_sources_are_detected() {
        let direct = PlanResolver::from_config(&AppConfig {
            config_path: "@https://example.com/config.yaml".into(),
            ..AppConfig::default()
        })
        .expect("resolver");
        assert_eq!(
            *direct.source(),
            PlanSource::Remote("https://example.com/config.yaml".into())
        );

        let repo = PlanResolver::from_config(&AppConfig {
            config_repo: Some("https://github.com/acme/binaries".into()),
            ..AppConfig::default()
        })
        .expect("resolver");
        assert_eq!(
            *repo.source(),
            PlanSource::Remote(
                "https://raw.githubusercontent.com/acme/binaries/main/config.yaml".into()
            )
        );
    }

    #[test]
    fn rejects_non_github_repositories() {
        assert!(github_raw_url("https://gitlab.com/acme/binaries").is_err());
        assert!(github_raw_url("not a url").is_err());
        assert!(github_raw_url("https://github.com/acme").is_err());
    }
}
