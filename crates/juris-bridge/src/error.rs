//! Error types for juris-bridge

use crate::config::ConfigError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use juris_ai::ErrorBody;
use std::net::AddrParseError;
use thiserror::Error;

/// Errors that stop the bridge from starting or serving
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid listen address {addr}: {source}")]
    InvalidListenAddr {
        addr: String,
        source: AddrParseError,
    },

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// A failed chat request, rendered as `{"error": "..."}`
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Upstream(#[from] juris_ai::Error),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Upstream(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Upstream(e) => e.user_message(),
            ApiError::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "chat request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "chat request rejected");
        }
        (status, Json(ErrorBody { error: self.message() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use juris_ai::error::{INVALID_KEY_MESSAGE, MISSING_KEY_MESSAGE, RATE_LIMIT_MESSAGE};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (juris_ai::Error::MissingCredential, 500, MISSING_KEY_MESSAGE),
            (juris_ai::Error::InvalidApiKey { status: 403 }, 403, INVALID_KEY_MESSAGE),
            (juris_ai::Error::RateLimited { retry_after: Some(3) }, 429, RATE_LIMIT_MESSAGE),
        ];
        for (error, status, message) in cases {
            let api = ApiError::from(error);
            assert_eq!(api.status().as_u16(), status);
            assert_eq!(api.message(), message);
        }

        let api = ApiError::from(juris_ai::Error::api(503, "overloaded"));
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.message(), "overloaded");
    }

    #[test]
    fn test_bad_request() {
        let api = ApiError::BadRequest("Nenhuma mensagem enviada.".to_string());
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
