use http::StatusCode;
use mime_guess::from_path;
use rust_embed::RustEmbed;
use spin_sdk::http::Response;

use crate::core::errors::{ApiError, ApiResult};

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

/// Serves an embedded asset; `file` is the path below `/static/`.
pub fn serve_static(file: &str) -> ApiResult<Response> {
    if file.split('/').any(|part| part == "..") {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    let asset =
        Assets::get(file).ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    let mime = from_path(file).first_or_octet_stream();

    Ok(Response::builder()
        .status(StatusCode::OK.as_u16())
        .header("Content-Type", mime.as_ref())
        .body(asset.data.to_vec())
        .build())
}
