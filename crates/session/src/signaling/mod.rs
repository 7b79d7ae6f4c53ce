//! Relay signaling: wire types and client

mod client;
pub mod protocol;

pub use client::Signaling;
#[cfg(feature = "client")]
pub use client::RelaySignalingClient;
#[cfg(feature = "client")]
pub(crate) use client::RelayHttp;

pub use protocol::{
    endpoints, AgentResponseBody, DestroyRequest, ErrorBody, IceServer, InitiateRequest,
    InitiateResponse, ProviderAck, SdpKind, SessionDescription, StreamCredentials, StreamOffer,
    SubmitAnswerRequest, TalkRequest, AUDIO_FIELD, CONNECT_TRIGGER, TEXT_FIELD,
};
