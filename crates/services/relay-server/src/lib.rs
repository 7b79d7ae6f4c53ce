//! AvatarLink relay backend
//!
//! Sits between session clients and the external services: forwards the four
//! signaling operations to the avatar provider's control-plane and answers
//! agent-response requests by chaining speech-to-text and text generation.
//!
//! ```text
//!   session client ──HTTP/JSON──► relay ──► avatar provider (streams, talks)
//!                                   │
//!                                   ├────► speech-to-text (audio turns)
//!                                   └────► text generation (replies, greeting)
//! ```
//!
//! Request and response bodies are the ones defined in
//! `avatarlink_session::signaling`, so both sides share one wire contract.

pub mod agent;
pub mod config;
pub mod error;
pub mod provider;
pub mod server;

pub use agent::{GeminiClient, GoogleSpeechClient, TextGenerator, Transcriber};
pub use config::{RelayArgs, RelayConfig, VoiceConfig};
pub use error::{RelayError, RelayResult};
pub use provider::{AvatarProvider, CreatedStream, DidProvider};
pub use server::{build_router, RelayServer, RelayState};
