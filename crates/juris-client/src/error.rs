//! Error types for juris-client

use thiserror::Error;

/// Result type alias using juris-client Error
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that end a chat request before any answer is streamed.
///
/// Aborts and failures after the response started are not errors: they
/// surface as a `StreamOutcome`.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be sent
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge answered with a non-success status
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

pub const CONNECT_FAILURE_MESSAGE: &str = "Não foi possível conectar ao servidor. Tente novamente.";

impl ClientError {
    /// Message suitable for a user-facing notification
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Rejected { message, .. } => message.clone(),
            ClientError::Http(_) => CONNECT_FAILURE_MESSAGE.to_string(),
        }
    }
}
