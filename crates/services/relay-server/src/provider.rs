//! Avatar provider control-plane
//!
//! [`DidProvider`] speaks the D-ID style streaming REST API:
//!
//! - `POST   {base}/talks/streams`            create a stream, returns the SDP offer
//! - `POST   {base}/talks/streams/{id}/sdp`   submit the client's SDP answer
//! - `POST   {base}/talks/streams/{id}`       make the avatar speak a script
//! - `DELETE {base}/talks/streams/{id}`       close the stream

use crate::config::{RelayConfig, VoiceConfig};
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use avatarlink_session::{IceServer, SessionDescription};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

/// Stream as returned by the provider on creation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreatedStream {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub offer: Option<SessionDescription>,
    #[serde(default)]
    pub ice_servers: Option<Vec<IceServer>>,
}

/// Provider-side operations on an avatar stream
#[async_trait]
pub trait AvatarProvider: Send + Sync {
    async fn create_stream(&self) -> RelayResult<CreatedStream>;

    async fn submit_answer(
        &self,
        stream_id: &str,
        session_id: &str,
        answer: &SessionDescription,
    ) -> RelayResult<Value>;

    async fn start_talk(&self, stream_id: &str, session_id: &str, text: &str)
        -> RelayResult<Value>;

    async fn destroy_stream(&self, stream_id: &str, session_id: &str) -> RelayResult<Value>;
}

/// reqwest-backed D-ID style provider
#[derive(Debug, Clone)]
pub struct DidProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    source_url: String,
    voice: VoiceConfig,
}

impl DidProvider {
    pub fn new(config: &RelayConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            api_key: config.provider_api_key.clone(),
            source_url: config.avatar_image_url.clone(),
            voice: config.voice.clone(),
        })
    }

    fn stream_url(&self, stream_id: &str) -> String {
        format!("{}/talks/streams/{}", self.base_url, stream_id)
    }

    fn headers(&self) -> RelayResult<HeaderMap> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RelayError::NotConfigured("Provider API key not configured.".into()))?;

        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Basic {}", key)).map_err(|_| {
            RelayError::NotConfigured("Provider API key is not a valid header value".into())
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Send a request and return the provider's JSON (or text) body
    async fn send(&self, operation: &str, request: reqwest::RequestBuilder) -> RelayResult<Value> {
        let response = request.headers(self.headers()?).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(
                operation,
                status = status.as_u16(),
                body = %body,
                "provider call failed"
            );
            let detail = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                body.trim().to_string()
            };
            return Err(RelayError::Provider {
                status: Some(status.as_u16()),
                message: format!("Failed to {}: HTTP {} {}", operation, status.as_u16(), detail),
            });
        }

        debug!(operation, status = status.as_u16(), "provider call succeeded");
        Ok(parse_body(&body))
    }
}

fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::String("OK".to_string());
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[async_trait]
impl AvatarProvider for DidProvider {
    async fn create_stream(&self) -> RelayResult<CreatedStream> {
        info!(source_url = %self.source_url, "creating provider stream");
        let request = self
            .client
            .post(format!("{}/talks/streams", self.base_url))
            .json(&json!({ "source_url": self.source_url }));

        let body = self.send("create stream", request).await?;
        serde_json::from_value(body).map_err(|e| RelayError::Provider {
            status: None,
            message: format!("Failed to parse stream creation response: {}", e),
        })
    }

    async fn submit_answer(
        &self,
        stream_id: &str,
        session_id: &str,
        answer: &SessionDescription,
    ) -> RelayResult<Value> {
        let request = self
            .client
            .post(format!("{}/sdp", self.stream_url(stream_id)))
            .json(&json!({ "session_id": session_id, "answer": answer }));
        self.send("submit SDP answer", request).await
    }

    async fn start_talk(
        &self,
        stream_id: &str,
        session_id: &str,
        text: &str,
    ) -> RelayResult<Value> {
        let payload = json!({
            "session_id": session_id,
            "script": {
                "type": "text",
                "input": text,
                "provider": {
                    "type": self.voice.provider,
                    "voice_id": self.voice.voice_id,
                },
            },
            "config": { "stitch": true },
        });
        let request = self.client.post(self.stream_url(stream_id)).json(&payload);
        self.send("start talk stream", request).await
    }

    async fn destroy_stream(&self, stream_id: &str, session_id: &str) -> RelayResult<Value> {
        let request = self
            .client
            .delete(self.stream_url(stream_id))
            .json(&json!({ "session_id": session_id }));
        self.send("destroy stream", request).await
    }
}
