//! Relay wire protocol
//!
//! JSON bodies exchanged between the session client and the relay backend.
//! The relay server crate serves the same types, so both sides agree on field
//! names by construction.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// Trigger payload that asks the relay to open a new stream
pub const CONNECT_TRIGGER: &str = "SYSTEM_CONNECT_REQUEST";

/// Relay endpoint paths
pub mod endpoints {
    pub const INITIATE: &str = "/initiate_stream";
    pub const SUBMIT_ANSWER: &str = "/submit_sdp_answer";
    pub const START_TALK: &str = "/start_talk_stream";
    pub const DESTROY: &str = "/destroy_session";
    pub const AGENT_RESPONSE: &str = "/get_agent_response";
}

/// Multipart field carrying typed user input
pub const TEXT_FIELD: &str = "text_input";

/// Multipart field carrying a recorded audio clip
pub const AUDIO_FIELD: &str = "audio_data";

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description as exchanged over signaling: `{"type": ..., "sdp": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// STUN/TURN server entry supplied by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs; a single string is accepted on the wire
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Stream identifier and provider session token
///
/// The two are issued together and used together, so they travel as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCredentials {
    pub stream_id: String,
    pub session_token: String,
}

impl StreamCredentials {
    pub fn new(stream_id: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            session_token: session_token.into(),
        }
    }
}

/// Body of the initiate request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub trigger: String,
}

/// Body of the initiate response
///
/// Every field is optional on the wire; [`InitiateResponse::into_offer`]
/// enforces completeness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_servers: Option<Vec<IceServer>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete result of a successful initiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOffer {
    pub credentials: StreamCredentials,
    pub offer: SessionDescription,
    pub ice_servers: Vec<IceServer>,
    pub greeting: Option<String>,
}

impl InitiateResponse {
    /// Check that all four session fields are present
    ///
    /// A missing (or blank) stream id, session token, offer or ICE server list
    /// is a signaling error naming the missing fields. An empty ICE list is
    /// accepted.
    pub fn into_offer(self) -> Result<StreamOffer> {
        self.into_offer_with_status(None)
    }

    /// Like [`into_offer`](Self::into_offer), with errors tagged by the HTTP
    /// status the response arrived with
    pub fn into_offer_with_status(self, status: Option<u16>) -> Result<StreamOffer> {
        let fail = |message: String| Error::SignalingError { status, message };

        if let Some(error) = self.error {
            return Err(fail(error));
        }

        let stream_id = self.stream_id.filter(|s| !s.trim().is_empty());
        let session_token = self.session_token.filter(|s| !s.trim().is_empty());
        let offer = self.offer.filter(|o| !o.sdp.trim().is_empty());

        let mut missing = Vec::new();
        if stream_id.is_none() {
            missing.push("stream_id");
        }
        if session_token.is_none() {
            missing.push("session_token");
        }
        if offer.is_none() {
            missing.push("offer");
        }
        if self.ice_servers.is_none() {
            missing.push("ice_servers");
        }

        match (stream_id, session_token, offer, self.ice_servers) {
            (Some(stream_id), Some(session_token), Some(offer), Some(ice_servers)) => {
                if offer.kind != SdpKind::Offer {
                    return Err(fail(format!(
                        "initiate returned a {:?} description instead of an offer",
                        offer.kind
                    )));
                }
                Ok(StreamOffer {
                    credentials: StreamCredentials {
                        stream_id,
                        session_token,
                    },
                    offer,
                    ice_servers,
                    greeting: self.greeting.filter(|g| !g.trim().is_empty()),
                })
            }
            _ => Err(fail(format!(
                "initiate response incomplete, missing: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Body of the submit-answer request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub stream_id: String,
    pub session_token: String,
    pub answer: SessionDescription,
}

/// Body of the start-talk request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkRequest {
    pub stream_id: String,
    pub session_token: String,
    pub text: String,
}

/// Body of the destroy request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRequest {
    pub stream_id: String,
    pub session_token: String,
}

/// Acknowledgement returned by submit-answer, start-talk and destroy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Provider response forwarded verbatim by the relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<serde_json::Value>,
}

/// Body of the agent-response reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_response_text: Option<String>,

    /// User input as the backend understood it (transcript for audio)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body returned by the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
