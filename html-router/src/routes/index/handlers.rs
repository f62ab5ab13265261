use std::collections::BTreeMap;

use axum::{extract::State, response::IntoResponse};
use serde::Serialize;

use common::storage::types::binary_version::BinaryVersion;

use crate::html_state::HtmlState;
use crate::middlewares::response_middleware::{HtmlError, TemplateResponse};
use crate::routes::display::DisplayVersion;

/// One (image, version tag) group within a network, newest first.
#[derive(Serialize)]
pub struct ImageGroup {
    pub docker_image: String,
    pub docker_version: String,
    pub extraction_date: String,
    pub total_size: u64,
    pub binaries: Vec<DisplayVersion>,
}

#[derive(Serialize)]
pub struct NetworkEntry {
    pub name: String,
    pub groups: Vec<ImageGroup>,
}

#[derive(Serialize)]
pub struct IndexPageData {
    pub networks: Vec<NetworkEntry>,
}

/// Main page showing all extracted binaries organized by network.
pub async fn index_handler(
    State(state): State<HtmlState>,
) -> Result<impl IntoResponse, HtmlError> {
    let versions = state.store.list(None, None, None).await?;

    Ok(TemplateResponse::new_template(
        "index.html",
        IndexPageData {
            networks: group_by_network(versions),
        },
    ))
}

fn group_by_network(versions: Vec<BinaryVersion>) -> Vec<NetworkEntry> {
    // BTreeMaps keep networks and groups in a stable order for rendering.
    let mut networks: BTreeMap<String, BTreeMap<(String, String), Vec<BinaryVersion>>> =
        BTreeMap::new();
    for version in versions {
        networks
            .entry(version.network.clone())
            .or_default()
            .entry((version.docker_image.clone(), version.docker_version.clone()))
            .or_default()
            .push(version);
    }

    networks
        .into_iter()
        .map(|(name, images)| {
            let mut groups: Vec<ImageGroup> = images
                .into_iter()
                .map(|((docker_image, docker_version), mut binaries)| {
                    binaries.sort_by(|a, b| b.extraction_date.cmp(&a.extraction_date));
                    let newest = binaries
                        .first()
                        .map(|v| v.extraction_date)
                        .unwrap_or_default();
                    ImageGroup {
                        docker_image,
                        docker_version,
                        extraction_date: DisplayVersion::format_date(newest),
                        total_size: binaries.iter().map(|v| v.size_bytes).sum(),
                        binaries: binaries.into_iter().map(DisplayVersion::from).collect(),
                    }
                })
                .collect();
            // Newest group first within the network.
            groups.sort_by(|a, b| b.extraction_date.cmp(&a.extraction_date));
            NetworkEntry { name, groups }
        })
        .collect()
}
