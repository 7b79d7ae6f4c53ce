//! Turn sequencing: user input → agent reply → avatar speech

use super::agent::{AgentClient, TurnInput};
use crate::events::StatusLevel;
use crate::session::SessionController;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Status shown when a reply cannot be spoken because media is down
pub const DEGRADED_STATUS: &str = "Connection issue. Try reconnecting.";

/// Whether the avatar was asked to speak the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Talk request accepted by the provider
    Requested,
    /// Transport was not up; reply left pending
    Skipped,
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    /// Normalized user input, when the backend reported one
    pub transcript: Option<String>,
    pub speech: SpeechOutcome,
}

/// Runs user turns on top of a connected session
///
/// Turns are serialized: a second `process` waits for the running one and then
/// re-checks that the session is still connected. Turn failures never reset
/// the session.
pub struct TurnProcessor {
    controller: SessionController,
    agent: Arc<dyn AgentClient>,
    turn_lock: tokio::sync::Mutex<()>,
}

impl TurnProcessor {
    pub fn new(controller: SessionController, agent: Arc<dyn AgentClient>) -> Self {
        Self {
            controller,
            agent,
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Process one unit of user input
    ///
    /// Fails with [`Error::NotConnected`] before any network call unless the
    /// session is Connected. Agent and talk failures are [`Error::TurnError`].
    /// A reply that cannot be spoken because the transport is down is a
    /// degraded success ([`SpeechOutcome::Skipped`]).
    pub async fn process(&self, input: TurnInput) -> Result<TurnOutcome> {
        self.controller.turn_context()?;

        if let TurnInput::Text(text) = &input {
            if text.trim().is_empty() {
                return Err(Error::TurnError("text input is empty".to_string()));
            }
        }

        let _turn = self.turn_lock.lock().await;
        let context = self.controller.turn_context()?;
        let stream_id = context.credentials.stream_id.as_str();

        let kind = match &input {
            TurnInput::Text(_) => "text",
            TurnInput::Audio(_) => "audio",
        };
        debug!(stream_id, input = kind, "processing turn");

        let reply = match self.agent.respond(&input).await {
            Ok(reply) if reply.agent_response_text.trim().is_empty() => {
                return Err(self.turn_failed("agent returned an empty reply".to_string()));
            }
            Ok(reply) => reply,
            Err(e) => {
                return Err(self.turn_failed(format!("agent response failed: {}", e)));
            }
        };

        if !self.controller.record_turn(
            context.generation,
            reply.user_text.as_deref(),
            &reply.agent_response_text,
        ) {
            info!(stream_id, "session reset during turn, reply discarded");
            return Err(Error::Superseded);
        }

        let outcome = |speech| TurnOutcome {
            reply: reply.agent_response_text.clone(),
            transcript: reply.user_text.clone(),
            speech,
        };

        if !self.controller.speech_ready() {
            warn!(stream_id, "transport not connected, reply left pending");
            self.controller.status(StatusLevel::Warning, DEGRADED_STATUS);
            return Ok(outcome(SpeechOutcome::Skipped));
        }

        let talk = self
            .controller
            .signaling()
            .request_talk(&context.credentials, &reply.agent_response_text)
            .await;
        self.controller.clear_pending_speech(context.generation);

        match talk {
            Ok(_) => {
                debug!(stream_id, "talk requested");
                Ok(outcome(SpeechOutcome::Requested))
            }
            Err(e) => Err(self.turn_failed(format!("talk request failed: {}", e))),
        }
    }

    fn turn_failed(&self, message: String) -> Error {
        warn!("{}", message);
        self.controller
            .status(StatusLevel::Warning, format!("Error: {}", message));
        Error::TurnError(message)
    }
}
