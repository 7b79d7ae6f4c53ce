//! Agent-response client

use crate::signaling::AgentResponseBody;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

#[cfg(feature = "client")]
use crate::config::SessionConfig;
#[cfg(feature = "client")]
use crate::signaling::{endpoints, RelayHttp, AUDIO_FIELD, TEXT_FIELD};

/// Recorded user audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(
        bytes: impl Into<Bytes>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Load a clip from a file
    ///
    /// A missing, unreadable or empty file is
    /// [`Error::CapabilityUnavailable`].
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::CapabilityUnavailable(format!("audio source {}: {}", path.display(), e))
        })?;

        if bytes.is_empty() {
            return Err(Error::CapabilityUnavailable(format!(
                "audio source {} is empty",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording.webm".to_string());
        let mime_type = mime_for_extension(path.extension().and_then(|e| e.to_str()));

        Ok(Self::new(bytes, file_name, mime_type))
    }
}

fn mime_for_extension(extension: Option<&str>) -> &'static str {
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("webm") => "audio/webm",
        Some("wav") => "audio/wav",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// One unit of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    Text(String),
    Audio(AudioClip),
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        TurnInput::Text(text.into())
    }
}

/// Agent reply for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub agent_response_text: String,
    /// User input as the backend understood it, when reported
    pub user_text: Option<String>,
}

impl TryFrom<AgentResponseBody> for AgentReply {
    type Error = Error;

    fn try_from(body: AgentResponseBody) -> Result<Self> {
        if let Some(error) = body.error {
            return Err(Error::signaling(error));
        }
        let agent_response_text = body
            .agent_response_text
            .ok_or_else(|| Error::signaling("agent response missing agent_response_text"))?;
        Ok(Self {
            agent_response_text,
            user_text: body.user_text,
        })
    }
}

/// Produces the agent's reply to user input
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn respond(&self, input: &TurnInput) -> Result<AgentReply>;
}

/// reqwest-backed [`AgentClient`] posting multipart input to the relay
#[cfg(feature = "client")]
#[derive(Debug, Clone)]
pub struct RelayAgentClient {
    http: RelayHttp,
}

#[cfg(feature = "client")]
impl RelayAgentClient {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            http: RelayHttp::new(config)?,
        })
    }
}

#[cfg(feature = "client")]
#[async_trait]
impl AgentClient for RelayAgentClient {
    async fn respond(&self, input: &TurnInput) -> Result<AgentReply> {
        use reqwest::multipart::{Form, Part};

        let form = match input {
            TurnInput::Text(text) => Form::new().text(TEXT_FIELD, text.clone()),
            TurnInput::Audio(clip) => {
                let part = Part::bytes(clip.bytes.to_vec())
                    .file_name(clip.file_name.clone())
                    .mime_str(&clip.mime_type)
                    .map_err(|e| {
                        Error::CapabilityUnavailable(format!(
                            "invalid audio MIME type {}: {}",
                            clip.mime_type, e
                        ))
                    })?;
                Form::new().part(AUDIO_FIELD, part)
            }
        };

        let body: AgentResponseBody = self
            .http
            .post_multipart(endpoints::AGENT_RESPONSE, form)
            .await?;
        AgentReply::try_from(body)
    }
}
