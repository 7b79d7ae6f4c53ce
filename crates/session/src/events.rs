//! Notifications published by a SessionController

use crate::chat::ChatEntry;
use crate::session::SessionState;
use crate::transport::{ConnectivitySnapshot, RenderSource};

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Event broadcast to session observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session state transition
    StateChanged { from: SessionState, to: SessionState },

    /// User-facing status line
    Status { level: StatusLevel, message: String },

    /// Entry appended to the chat log
    Chat(ChatEntry),

    /// Render source established, extended, or cleared (None)
    RenderSource(Option<RenderSource>),

    /// Raw connectivity report from the active transport
    Transport(ConnectivitySnapshot),
}

impl SessionEvent {
    pub(crate) fn status(level: StatusLevel, message: impl Into<String>) -> Self {
        SessionEvent::Status {
            level,
            message: message.into(),
        }
    }
}
