//! Response inspection helpers.
//!
//! # Responsibilities
//! - Extract the MIME essence of the Content-Type header
//! - Read the declared Content-Length
//! - Build the 502 sent when a response cannot be delivered

use axum::body::Body;
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;

/// Lowercased `type/subtype` with any parameters dropped.
pub fn content_type_essence(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// Declared body length, if present and well formed.
pub fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Response sent to the client when the upstream exchange fails.
pub fn bad_gateway(message: &'static str) -> Response<Body> {
    (StatusCode::BAD_GATEWAY, message).into_response()
}
