//! Request rewriting toward the upstream origin.
//!
//! # Responsibilities
//! - Point the request target at the upstream (scheme, authority, joined path)
//! - Merge the upstream base query with the request query
//! - Set the Host header to the upstream's
//! - Leave every other end-to-end header and the body untouched
//!
//! # Design Decisions
//! - Request ID is for logs only and does not alter forwarded headers
//! - The body is streamed through, never buffered

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Uri, Version};
use url::Url;
use uuid::Uuid;

use crate::http::headers::strip_hop_by_hop;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation id for log lines about this request.
///
/// Reuses a client-supplied `x-request-id`, otherwise generates a UUID v4.
/// The id is only logged; it is never added to forwarded headers.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// `host[:port]` of the upstream origin.
pub fn upstream_authority(base: &Url) -> String {
    let host = base.host_str().unwrap_or_default();
    match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Join two URL paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Rewrite an inbound request URI onto the upstream base URL.
pub fn rewrite_uri(base: &Url, uri: &Uri) -> Result<Uri, axum::http::Error> {
    let mut path_and_query = join_paths(base.path(), uri.path());

    let query = match (base.query().filter(|q| !q.is_empty()), uri.query().filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };
    if let Some(query) = query {
        path_and_query.push('?');
        path_and_query.push_str(&query);
    }

    let authority = upstream_authority(base);
    Uri::builder()
        .scheme(base.scheme())
        .authority(authority.as_str())
        .path_and_query(path_and_query.as_str())
        .build()
}

/// Turn an inbound request into the request sent upstream.
pub fn to_upstream(request: Request<Body>, base: &Url) -> Result<Request<Body>, axum::http::Error> {
    let (mut parts, body) = request.into_parts();

    parts.uri = rewrite_uri(base, &parts.uri)?;
    // Upstream is always spoken to over HTTP/1.1
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    parts
        .headers
        .insert(header::HOST, HeaderValue::from_str(&upstream_authority(base))?);

    Ok(Request::from_parts(parts, body))
}
