//! Relay error types and their HTTP mapping

use avatarlink_session::signaling::{AgentResponseBody, ErrorBody};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Result type alias for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Errors surfaced by relay routes
///
/// Every variant renders as a JSON body with an `error` field.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Request is missing a field or is malformed
    #[error("{0}")]
    BadRequest(String),

    /// A required credential or setting is absent
    #[error("{0}")]
    NotConfigured(String),

    /// Avatar provider rejected a call
    #[error("{message}")]
    Provider {
        /// Upstream HTTP status, if a response was received
        status: Option<u16>,
        message: String,
    },

    /// Text generation failed; carries the user text already processed
    #[error("{message}")]
    Agent {
        message: String,
        user_text: Option<String>,
    },

    /// Audio produced no transcript
    #[error("{0}")]
    Transcription(String),

    /// Upstream request could not be sent or read
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    pub fn missing(field: &str) -> Self {
        RelayError::BadRequest(format!("{} is required", field))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) | RelayError::Transcription(_) => StatusCode::BAD_REQUEST,
            RelayError::NotConfigured(_)
            | RelayError::Provider { .. }
            | RelayError::Agent { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            RelayError::Agent { message, user_text } => (
                status,
                Json(AgentResponseBody {
                    agent_response_text: None,
                    user_text,
                    error: Some(message),
                }),
            )
                .into_response(),
            other => (
                status,
                Json(ErrorBody {
                    error: other.to_string(),
                }),
            )
                .into_response(),
        }
    }
}
