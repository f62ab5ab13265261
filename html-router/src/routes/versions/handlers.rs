use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use crate::html_state::HtmlState;
use crate::middlewares::response_middleware::{HtmlError, TemplateResponse};
use crate::routes::display::DisplayVersion;

#[derive(Serialize)]
pub struct VersionsPageData {
    pub network: String,
    pub versions: Vec<DisplayVersion>,
}

/// All version records for one network, newest first.
pub async fn show_versions(
    State(state): State<HtmlState>,
    Path(network): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let versions = state.store.list(Some(&network), None, None).await?;

    Ok(TemplateResponse::new_template(
        "versions.html",
        VersionsPageData {
            network,
            versions: versions.into_iter().map(DisplayVersion::from).collect(),
        },
    ))
}
