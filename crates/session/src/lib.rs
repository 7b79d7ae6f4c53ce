//! Session and signaling orchestration for talking-avatar streams
//!
//! This crate drives an interactive avatar session: it asks a relay backend to
//! open a remote avatar stream, answers the provider's WebRTC offer, tracks the
//! peer connection until media can flow, and then sequences user turns (user
//! input → agent reply → avatar speech) on top of the established session.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  SessionController (authoritative Session state)           │
//! │  ├─ Signaling (relay: initiate / answer / talk / destroy)  │
//! │  ├─ TransportFactory → PeerTransport (TransportManager)    │
//! │  │   └─ TransportEvent channel → connectivity reducer      │
//! │  ├─ ChatLog (user/agent turns)                             │
//! │  └─ SessionEvent broadcast → observers (console, UI)       │
//! │                                                            │
//! │  TurnProcessor (one turn at a time)                        │
//! │  ├─ AgentClient (relay: agent response)                    │
//! │  └─ Signaling::request_talk (only while media is up)       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `Idle → Connecting → AwaitingTransport → Connected`, with every fatal error
//! and every connectivity loss routed through one idempotent reset back to
//! `Idle`. A session only becomes `Connected` once the provider accepted the
//! local answer *and* the transport reports ICE and peer connectivity.
//!
//! # Example
//!
//! ```
//! use avatarlink_session::SessionConfig;
//!
//! let config = SessionConfig::default()
//!     .with_relay_url("http://127.0.0.1:5000")
//!     .with_request_timeout_secs(15);
//!
//! assert!(config.validate().is_ok());
//! ```

#![warn(clippy::all)]

pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod turn;

pub use chat::{ChatEntry, ChatLog, Speaker};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{SessionEvent, StatusLevel};
pub use session::{Session, SessionController, SessionState};
pub use signaling::{
    IceServer, SdpKind, SessionDescription, Signaling, StreamCredentials, StreamOffer,
};
pub use transport::{
    Connectivity, ConnectivitySnapshot, PeerTransport, RenderSource, TransportEvent,
    TransportEventKind, TransportFactory, TransportId,
};
pub use turn::{AgentClient, AgentReply, AudioClip, SpeechOutcome, TurnInput, TurnOutcome, TurnProcessor};

#[cfg(feature = "client")]
pub use signaling::RelaySignalingClient;
#[cfg(feature = "client")]
pub use turn::RelayAgentClient;
#[cfg(feature = "webrtc-transport")]
pub use transport::{TransportManager, WebRtcTransportFactory};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
