use axum::{extract::State, Json};

use crate::{api_state::ApiState, error::ApiError};

/// All networks that have at least one committed binary version.
pub async fn get_networks(State(state): State<ApiState>) -> Result<Json<Vec<String>>, ApiError> {
    let networks = state.store.networks().await?;
    Ok(Json(networks))
}
