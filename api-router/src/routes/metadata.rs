use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use common::storage::types::binary_version::BinaryVersion;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Deserialize)]
pub struct MetadataFilter {
    network: Option<String>,
    binary_name: Option<String>,
    docker_image: Option<String>,
}

/// Metadata for all committed binary versions, optionally filtered by
/// network, binary name or originating image.
pub async fn get_metadata(
    State(state): State<ApiState>,
    Query(filter): Query<MetadataFilter>,
) -> Result<Json<Vec<BinaryVersion>>, ApiError> {
    // Normalize empty strings to None
    let network = filter.network.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let binary_name = filter
        .binary_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let docker_image = filter
        .docker_image
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let versions = state.store.list(network, binary_name, docker_image).await?;
    Ok(Json(versions))
}
