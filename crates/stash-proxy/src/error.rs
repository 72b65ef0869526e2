//! Proxy error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Cache(#[from] stash_core::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Cache(stash_core::Error::Offline(_)) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Cache(stash_core::Error::Network(_)) => StatusCode::BAD_GATEWAY,
            ProxyError::Cache(stash_core::Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let offline = ProxyError::from(stash_core::Error::Offline("/x".to_string()));
        assert_eq!(offline.status(), StatusCode::GATEWAY_TIMEOUT);

        let network = ProxyError::from(stash_core::Error::Network("refused".to_string()));
        assert_eq!(network.status(), StatusCode::BAD_GATEWAY);

        let storage = ProxyError::from(stash_core::Error::Storage("disk full".to_string()));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ProxyError::BadRequest("body".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
