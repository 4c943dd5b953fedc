//! Error types for juris-ai

use thiserror::Error;

/// Result type alias using juris-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fixed message shown when the upstream rejects our credential.
pub const INVALID_KEY_MESSAGE: &str =
    "Chave de API inválida. Verifique a configuração do servidor.";

/// Fixed message shown when the upstream rate-limits us.
pub const RATE_LIMIT_MESSAGE: &str =
    "Limite de requisições atingido. Aguarde alguns instantes e tente novamente.";

/// Fixed message for transport and decode failures; their own text may
/// carry request details and is only logged.
pub const UPSTREAM_FAILURE_MESSAGE: &str =
    "Erro ao comunicar com o modelo. Tente novamente em instantes.";

/// Fixed message shown when no credential is configured at all.
pub const MISSING_KEY_MESSAGE: &str =
    "GEMINI_API_KEY não configurada. Defina a variável de ambiente ou o arquivo de configuração.";

/// Errors that can occur when talking to the upstream model
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed. The request URL is stripped on conversion.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// The upstream rejected the configured credential
    #[error("Invalid API key (upstream status {status})")]
    InvalidApiKey { status: u16 },

    /// No credential configured
    #[error("Missing API key")]
    MissingCredential,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.without_url())
    }
}

impl Error {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify a non-success upstream response.
    ///
    /// Gemini answers a bad key with a 400 whose body mentions the key, so
    /// the body is inspected as well as the status.
    pub fn from_upstream(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let lower = body.to_lowercase();
        match status {
            401 | 403 => Error::InvalidApiKey { status },
            400 if lower.contains("api key") || lower.contains("api_key_invalid") => {
                Error::InvalidApiKey { status }
            }
            429 => Error::RateLimited { retry_after },
            _ => Error::Api {
                status,
                message: extract_upstream_message(body).unwrap_or_else(|| body.trim().to_string()),
            },
        }
    }

    /// HTTP status the bridge should answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingCredential => 500,
            Error::InvalidApiKey { status } => *status,
            Error::RateLimited { .. } => 429,
            Error::Api { status, .. } => *status,
            Error::Http(_) | Error::Json(_) | Error::UnexpectedResponse(_) => 502,
        }
    }

    /// Human-readable message suitable for showing to the end user
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingCredential => MISSING_KEY_MESSAGE.to_string(),
            Error::InvalidApiKey { .. } => INVALID_KEY_MESSAGE.to_string(),
            Error::RateLimited { .. } => RATE_LIMIT_MESSAGE.to_string(),
            Error::Api { message, .. } if !message.is_empty() => message.clone(),
            _ => UPSTREAM_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Check if this error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Pull `error.message` out of a Google-style error body.
fn extract_upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
