use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::{
    storage::{content_store::ContentStore, store::StorageManager},
    utils::config::{get_config, AppConfig},
};
use html_router::{html_routes, html_state::HtmlState};
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

    let html_state = HtmlState::new(store.clone(), config.clone());
    let api_state = ApiState::new(&config, store);
    let app = build_app(api_state, html_state, &config);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
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
