use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use flate2::{write::GzEncoder, Compression};
use tracing::info;

use common::error::AppError;
use common::storage::types::binary_version::BinaryVersion;

use crate::html_state::HtmlState;
use crate::middlewares::response_middleware::{HtmlError, TemplateResponse};

/// Download the latest version of a binary within a network.
pub async fn download_latest(
    State(state): State<HtmlState>,
    Path((network, binary_name)): Path<(String, String)>,
) -> Result<Response, HtmlError> {
    let Some(version) = state.store.latest(&network, &binary_name).await? else {
        return Ok(TemplateResponse::not_found().into_response());
    };
    info!(
        network = %network,
        binary = %binary_name,
        docker_version = %version.docker_version,
        "serving latest binary"
    );
    stream_version(&state, &version).await
}

/// Download a specific version of a binary by its content hash.
pub async fn download_versioned(
    State(state): State<HtmlState>,
    Path((network, sha256, binary_name)): Path<(String, String, String)>,
) -> Result<Response, HtmlError> {
    let Some(version) = state.store.find(&network, &sha256).await? else {
        return Ok(TemplateResponse::not_found().into_response());
    };
    if version.binary_name != binary_name {
        return Ok(TemplateResponse::not_found().into_response());
    }
    stream_version(&state, &version).await
}

/// Bundle every binary extracted from one (network, image, version) into a
/// tar.gz archive, entries named by their original in-image paths.
pub async fn download_bundle(
    State(state): State<HtmlState>,
    Path((network, image_and_version)): Path<(String, String)>,
) -> Result<Response, HtmlError> {
    // The wildcard holds `{docker_image}/{docker_version}` and the image
    // reference itself contains slashes; the tag is the last segment.
    let Some((docker_image, docker_version)) = image_and_version.rsplit_once('/') else {
        return Ok(TemplateResponse::bad_request("missing image version").into_response());
    };

    let versions = state
        .store
        .versions_for_image(&network, docker_image, docker_version)
        .await?;
    if versions.is_empty() {
        return Ok(TemplateResponse::not_found().into_response());
    }

    let mut entries = Vec::with_capacity(versions.len());
    for version in &versions {
        let bytes = state.store.get_bytes(version).await?.to_vec();
        let entry_path = version.original_path.trim_start_matches('/').to_string();
        entries.push((entry_path, bytes));
    }

    let archive = tokio::task::spawn_blocking(move || build_tar_gz(entries))
        .await
        .map_err(AppError::from)?
        .map_err(AppError::from)?;

    let image_basename = docker_image.rsplit('/').next().unwrap_or(docker_image);
    let download_name = format!(
        "{}_{}.tar.gz",
        BinaryVersion::sanitize_file_name(image_basename),
        BinaryVersion::sanitize_file_name(docker_version)
    );
    info!(
        network = %network,
        image = %docker_image,
        docker_version = %docker_version,
        binaries = versions.len(),
        "serving binary bundle"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/gzip"),
    );
    insert_attachment(&mut headers, &download_name);
    Ok((StatusCode::OK, headers, archive).into_response())
}

/// Stream a committed blob as an attachment, named `{binary}_{version}`.
async fn stream_version(
    state: &HtmlState,
    version: &BinaryVersion,
) -> Result<Response, HtmlError> {
    let stream = match state.store.get_stream(version).await {
        Ok(stream) => stream,
        Err(_) => return Ok(TemplateResponse::server_error().into_response()),
    };
    let body = Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    insert_attachment(&mut headers, &version.download_file_name());
    // Blobs are content-addressed, so they never change under a hash.
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok((StatusCode::OK, headers, body).into_response())
}

fn insert_attachment(headers: &mut HeaderMap, file_name: &str) {
    match HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\"")) {
        Ok(value) => headers.insert(header::CONTENT_DISPOSITION, value),
        Err(_) => headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment"),
        ),
    };
}

fn build_tar_gz(entries: Vec<(String, Vec<u8>)>) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, bytes) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, bytes.as_slice())?;
    }
    builder.into_inner()?.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn bundle_contains_entries_under_their_original_paths() {
        let entries = vec![
            ("usr/local/bin/geth".to_string(), b"geth bytes".to_vec()),
            ("usr/local/bin/clef".to_string(), b"clef bytes".to_vec()),
        ];

        let archive = build_tar_gz(entries).expect("build archive");

        let mut tar = tar::Archive::new(GzDecoder::new(archive.as_slice()));
        let mut seen = Vec::new();
        for entry in tar.entries().expect("entries") {
            let mut entry = entry.expect("entry");
            let path = entry.path().expect("path").to_string_lossy().into_owned();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).expect("read entry");
            seen.push((path, contents));
        }

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "usr/local/bin/geth");
        assert_eq!(seen[0].1, b"geth bytes");
        assert_eq!(seen[1].0, "usr/local/bin/clef");
        assert_eq!(seen[1].1, b"clef bytes");
    }

    #[test]
    fn empty_bundle_is_still_a_valid_archive() {
        let archive = build_tar_gz(Vec::new()).expect("build archive");
        let mut tar = tar::Archive::new(GzDecoder::new(archive.as_slice()));
        assert_eq!(tar.entries().expect("entries").count(), 0);
    }
}
