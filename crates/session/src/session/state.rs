//! Session record and its connection reducer

use crate::signaling::StreamCredentials;
use crate::transport::Connectivity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Initiate request in flight
    Connecting,
    /// Stream open, negotiating and waiting for media
    AwaitingTransport,
    /// Answer accepted and transport up
    Connected,
    /// Remote destroy in flight
    Closing,
    /// Fatal error, about to reset
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingTransport => "awaiting-transport",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Input to the connection reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The provider accepted the local answer
    AnswerAccepted,
    /// Derived connectivity of the active transport changed
    Connectivity(Connectivity),
}

/// What the controller must do after a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// AwaitingTransport → Connected
    BecameConnected,
    /// Connectivity lost while a session is active; full reset required
    Lost,
}

/// The unit of lifecycle
///
/// `credentials` is None exactly when no remote stream is known; stream id
/// and token cannot be present independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    pub credentials: Option<StreamCredentials>,
    /// Most recent agent reply waiting to be spoken
    pub pending_speech_text: Option<String>,
    /// The provider accepted the local answer
    pub answer_submitted: bool,
    /// Last derived connectivity of the active transport
    pub connectivity: Option<Connectivity>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.stream_id.as_str())
    }

    /// Record a signal and evaluate the Connected conjunction
    ///
    /// Connected requires both an accepted answer and transport connectivity
    /// up. The two arrive in either order; whichever comes second completes
    /// the transition.
    pub fn apply(&mut self, signal: Signal) -> Transition {
        match signal {
            Signal::AnswerAccepted => self.answer_submitted = true,
            Signal::Connectivity(connectivity) => {
                self.connectivity = Some(connectivity);
                if connectivity == Connectivity::Lost && self.is_active() {
                    return Transition::Lost;
                }
            }
        }

        if self.state == SessionState::AwaitingTransport
            && self.answer_submitted
            && self.connectivity == Some(Connectivity::Up)
        {
            self.state = SessionState::Connected;
            return Transition::BecameConnected;
        }

        Transition::Unchanged
    }
}
