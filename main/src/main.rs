use std::sync::Arc;
use std::time::Duration;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::{
    error::AppError,
    storage::{content_store::ContentStore, store::StorageManager},
    utils::config::{get_config, AppConfig, Mode},
};
use extraction_pipeline::{
    extractor::ExtractionEngine, resolver::PlanResolver, run_extractor_loop, runtime::DockerCli,
};
use html_router::{html_routes, html_state::HtmlState};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let storage = StorageManager::new(&config).await?;
    let store = ContentStore::new(storage);

    match config.mode {
        Mode::Extract => {
            info!("Running in extract-only mode");
            run_extractor(config, store, shutdown_signal()).await?;
        }
        Mode::Web => {
            info!("Running in web-only mode");
            run_server(config, store).await?;
        }
        Mode::Both => {
            info!("Running in both extract and web mode");
            let extractor = tokio::spawn(run_extractor(
                config.clone(),
                store.clone(),
                shutdown_signal(),
            ));

            // Whichever half fails first takes the process down with it; an
            // unrecoverable store error in the extractor must not leave a
            // half-alive web process behind.
            tokio::select! {
                result = extractor => result??,
                result = run_server(config, store) => result?,
            }
        }
    }

    Ok(())
}

async fn run_extractor(
    config: AppConfig,
    store: ContentStore,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let resolver = PlanResolver::from_config(&config)?;
    let runtime = Arc::new(DockerCli::new(
        config.docker_platform_support,
        Duration::from_secs(config.docker_timeout_secs),
    ));
    let engine = ExtractionEngine::new(store, runtime);

    info!("Starting extractor process");
    run_extractor_loop(
        resolver,
        engine,
        Duration::from_secs(config.poll_interval_secs),
        shutdown,
    )
    .await
}

async fn run_server(config: AppConfig, store: ContentStore) -> Result<(), std::io::Error> {
    let html_state = HtmlState::new(store.clone(), config.clone());
    let api_state = ApiState::new(&config, store);
    let app = build_app(api_state, html_state, &config);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await
}

/// Flips to true on ctrl-c so the loop can park in `Stopped`.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(true);
            }
            // Keep the sender alive so the loop never sees a closed channel.
            Err(_) => std::future::pending::<()>().await,
        }
    });
    rx
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
    html_state: HtmlState,
}

/// Assemble the full router, nested under the proxy path prefix when one
/// is configured.
fn build_app(api_state: ApiState, html_state: HtmlState, config: &AppConfig) -> Router {
    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .merge(html_routes(&html_state))
        .with_state(AppState {
            api_state,
            html_state,
        });

    let proxy_path = config.proxy_path.trim_end_matches('/');
    if proxy_path.is_empty() {
        app
    } else if proxy_path.starts_with('/') {
        Router::new().nest(proxy_path, app)
    } else {
        Router::new().nest(&format!("/{proxy_path}"), app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::storage::content_store::NewBinaryVersion;
    use common::utils::config::StorageKind;
    use tower::ServiceExt;

    fn smoke_test_config() -> AppConfig {
        AppConfig {
            storage: StorageKind::Memory,
            http_port: 0,
            ..AppConfig::default()
        }
    }

    async fn test_app(config: &AppConfig) -> (Router, ContentStore) {
        let storage = StorageManager::new(config).await.expect("storage manager");
        let store = ContentStore::new(storage);
        let html_state = HtmlState::new(store.clone(), config.clone());
        let api_state = ApiState::new(config, store.clone());
        (build_app(api_state, html_state, config), store)
    }

    async fn get(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response")
    }

    #[tokio::test]
    async fn smoke_startup_with_in_memory_store() {
        let config = smoke_test_config();
        let (app, _store) = test_app(&config).await;

        for uri in ["/api/v1/live", "/api/v1/ready", "/api/v1/networks", "/"] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        }
    }

    #[tokio::test]
    async fn download_round_trip_through_the_router() {
        let config = smoke_test_config();
        let (app, store) = test_app(&config).await;

        let record = store
            .put(
                NewBinaryVersion {
                    network: "ethereum".into(),
                    docker_image: "ethereum/client-go".into(),
                    docker_version: "latest".into(),
                    original_path: "/usr/local/bin/geth".into(),
                },
                b"geth bytes",
            )
            .await
            .expect("put");

        let response = get(&app, "/binaries/ethereum/geth").await;
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(axum::http::header::CONTENT_DISPOSITION)
            .expect("disposition header")
            .to_str()
            .expect("header value")
            .to_string();
        assert!(disposition.contains("geth_latest"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body.as_ref(), b"geth bytes");

        let by_hash = format!("/binaries/ethereum/{}/geth", record.sha256);
        let response = get(&app, &by_hash).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body.as_ref(), b"geth bytes");

        let response = get(&app, "/bundles/ethereum/ethereum/client-go/latest").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, "/binaries/ethereum/unknown").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metadata_endpoint_lists_and_filters() {
        let config = smoke_test_config();
        let (app, store) = test_app(&config).await;

        store
            .put(
                NewBinaryVersion {
                    network: "ethereum".into(),
                    docker_image: "ethereum/client-go".into(),
                    docker_version: "latest".into(),
                    original_path: "/usr/local/bin/geth".into(),
                },
                b"geth bytes",
            )
            .await
            .expect("put");

        let response = get(&app, "/api/v1/metadata?network=ethereum").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let versions: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(versions.as_array().expect("array").len(), 1);
        assert_eq!(versions[0]["binary_name"], "geth");

        let response = get(&app, "/api/v1/metadata?network=unknown").await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let versions: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert!(versions.as_array().expect("array").is_empty());
    }

    #[tokio::test]
    async fn proxy_path_prefixes_every_route() {
        let config = AppConfig {
            proxy_path: "/extractor".into(),
            ..smoke_test_config()
        };
        let (app, _store) = test_app(&config).await;

        let response = get(&app, "/extractor/api/v1/live").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, "/api/v1/live").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
