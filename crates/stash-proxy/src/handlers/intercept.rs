//! Fallback handler that routes every non-management request through the
//! worker.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    response::Response,
};
use stash_cache::{Served, is_hop_by_hop};
use stash_core::{FetchRequest, Method};
use std::sync::Arc;
use url::Url;

use crate::error::ProxyError;
use crate::state::AppState;

/// Response header naming where the body came from.
pub const SOURCE_HEADER: &str = "x-stash-source";

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub async fn intercept(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ProxyError> {
    let fetch = into_fetch_request(&state, request).await?;
    let served = state.worker.handle_fetch(&fetch).await?;
    Ok(render(served))
}

async fn into_fetch_request(state: &AppState, request: Request) -> Result<FetchRequest, ProxyError> {
    let (parts, body) = request.into_parts();

    let url = upstream_url(&state.origin, &parts.uri);

    let method = parts
        .method
        .as_str()
        .parse::<Method>()
        .unwrap_or_else(|never| match never {});

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::BadRequest(format!("Failed to read body: {}", e)))?;

    Ok(FetchRequest {
        method,
        url,
        headers,
        body: body.to_vec(),
    })
}

/// Place the request's path and query on the origin. Any scheme or
/// authority in the request target is ignored, so a path such as
/// `//other.host/x` stays on the origin.
pub fn upstream_url(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

/// Turn a worker answer into an HTTP response, tagged with its source.
pub fn render(served: Served) -> Response {
    let source = served.source;
    let snapshot = served.response;

    let mut response = Response::new(Body::from(snapshot.body));
    *response.status_mut() =
        StatusCode::from_u16(snapshot.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for (name, value) in &snapshot.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source.as_str()));
    response
}
