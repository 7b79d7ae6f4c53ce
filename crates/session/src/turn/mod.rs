//! User turns

mod agent;
mod processor;

pub use agent::{AgentClient, AgentReply, AudioClip, TurnInput};
#[cfg(feature = "client")]
pub use agent::RelayAgentClient;
pub use processor::{SpeechOutcome, TurnOutcome, TurnProcessor, DEGRADED_STATUS};
