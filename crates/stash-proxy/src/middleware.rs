//! HTTP middleware for the proxy.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag each request and its response with a request ID, keeping one the
/// client already sent.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = match request.headers().get(REQUEST_ID_HEADER) {
        Some(existing) => existing.clone(),
        None => match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            Ok(generated) => generated,
            Err(_) => return next.run(request).await,
        },
    };
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}
