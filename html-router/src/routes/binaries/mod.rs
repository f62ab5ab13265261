pub mod handlers;

use axum::{extract::FromRef, routing::get, Router};
use handlers::{download_bundle, download_latest, download_versioned};

use crate::html_state::HtmlState;

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    Router::new()
        .route("/binaries/{network}/{binary_name}", get(download_latest))
        .route(
            "/binaries/{network}/{sha256}/{binary_name}",
            get(download_versioned),
        )
        // The image reference contains slashes, so it shares a wildcard
        // segment with the version tag: /bundles/{network}/{image...}/{tag}
        .route("/bundles/{network}/{*image_and_version}", get(download_bundle))
}
