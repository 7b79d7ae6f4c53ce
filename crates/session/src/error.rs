//! Error types for avatar sessions

use crate::session::SessionState;

/// Result type alias using session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running an avatar session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Relay call failed or returned malformed/incomplete data
    #[error("Signaling error{}: {message}", format_status(.status))]
    SignalingError {
        /// HTTP status of the relay response, if one was received
        status: Option<u16>,
        /// Human-readable failure description
        message: String,
    },

    /// Local transport could not apply the offer or produce an answer
    #[error("SDP negotiation error: {0}")]
    NegotiationError(String),

    /// Transport reported failed, disconnected or closed
    #[error("Connectivity lost: {0}")]
    ConnectivityLost(String),

    /// Agent response or talk request failed for a single turn
    #[error("Turn error: {0}")]
    TurnError(String),

    /// Turn attempted while the session is not connected
    #[error("Session not connected (state: {0})")]
    NotConnected(SessionState),

    /// A local capability (audio source, device) is unavailable
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The session was reset while this operation was in flight; its result was discarded
    #[error("Operation superseded by a session reset")]
    Superseded,

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl Error {
    /// Build a signaling error without an HTTP status
    pub fn signaling(message: impl Into<String>) -> Self {
        Error::SignalingError {
            status: None,
            message: message.into(),
        }
    }

    /// Build a signaling error carrying the relay's HTTP status
    pub fn signaling_status(status: u16, message: impl Into<String>) -> Self {
        Error::SignalingError {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Errors that always tear the session down, whatever phase they occur in
    ///
    /// Signaling errors are fatal only during initiation and negotiation, so
    /// the caller decides for those.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NegotiationError(_) | Error::ConnectivityLost(_) | Error::WebRtcError(_)
        )
    }

    /// Errors that only affect the current turn
    pub fn is_turn_scoped(&self) -> bool {
        matches!(
            self,
            Error::TurnError(_) | Error::NotConnected(_) | Error::CapabilityUnavailable(_)
        )
    }

    /// HTTP status reported by the relay, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::SignalingError { status, .. } => *status,
            _ => None,
        }
    }
}
