use axum::{extract::FromRef, routing::get, Router};

use api_state::ApiState;
use routes::{
    liveness::live, metadata::get_metadata, networks::get_networks, readiness::ready,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        // Probes for k8s/systemd
        .route("/live", get(live))
        .route("/ready", get(ready))
        // Read-only catalogue endpoints
        .route("/metadata", get(get_metadata))
        .route("/networks", get(get_networks))
}
