//! Relay signaling client
//!
//! Issues the four signaling calls of a session to the relay backend:
//!
//! - POST /initiate_stream: open a provider stream, receive offer + ICE servers
//! - POST /submit_sdp_answer: hand the local answer to the provider
//! - POST /start_talk_stream: make the avatar speak a reply
//! - POST /destroy_session: close the provider stream
//!
//! A non-2xx status and a body carrying an `error` field are reported the same
//! way, as [`Error::SignalingError`] with the status and message.

use super::protocol::{ProviderAck, SessionDescription, StreamCredentials, StreamOffer};
use crate::{Error, Result};
use async_trait::async_trait;

#[cfg(feature = "client")]
use super::protocol::{
    endpoints, DestroyRequest, InitiateRequest, InitiateResponse, SubmitAnswerRequest,
    TalkRequest,
};
#[cfg(feature = "client")]
use crate::config::SessionConfig;
#[cfg(feature = "client")]
use serde::{de::DeserializeOwned, Serialize};
#[cfg(feature = "client")]
use tracing::{debug, warn};

/// Signaling operations against the relay backend
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Open a remote stream; fails on any missing session field
    async fn initiate(&self) -> Result<StreamOffer>;

    /// Submit the local answer for an initiated stream
    async fn submit_answer(
        &self,
        credentials: &StreamCredentials,
        answer: &SessionDescription,
    ) -> Result<ProviderAck>;

    /// Ask the avatar to speak `text`
    async fn request_talk(&self, credentials: &StreamCredentials, text: &str)
        -> Result<ProviderAck>;

    /// Close the remote stream
    async fn destroy_session(&self, credentials: &StreamCredentials) -> Result<()>;
}

/// Interpret a relay response body
///
/// Returns the parsed JSON on success. A non-2xx status or an `error` field
/// in the body produces a signaling error carrying `status`.
#[cfg_attr(not(feature = "client"), allow(dead_code))]
pub(crate) fn check_relay_response(status: u16, body: &str) -> Result<serde_json::Value> {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();

    let error_field = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .filter(|e| !e.is_null())
        .map(|e| match e.as_str() {
            Some(s) => s.to_string(),
            None => e.to_string(),
        });

    if !(200..300).contains(&status) {
        let message = error_field.unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                "empty response body".to_string()
            } else {
                text.to_string()
            }
        });
        return Err(Error::signaling_status(status, message));
    }

    if let Some(message) = error_field {
        return Err(Error::signaling_status(status, message));
    }

    parsed.ok_or_else(|| Error::signaling_status(status, "response body is not valid JSON"))
}

/// Shared HTTP plumbing for relay clients
#[cfg(feature = "client")]
#[derive(Debug, Clone)]
pub(crate) struct RelayHttp {
    base_url: String,
    client: reqwest::Client,
}

#[cfg(feature = "client")]
impl RelayHttp {
    pub(crate) fn new(config: &SessionConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.relay_base().to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (_, value) = self.post_json_with_status(path, body).await?;
        Ok(value)
    }

    /// POST a JSON body, returning the parsed reply with its HTTP status
    pub(crate) async fn post_json_with_status<B, T>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, T)>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);
        self.execute(path, request).await
    }

    pub(crate) async fn post_multipart<T>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).multipart(form);
        let (_, value) = self.execute(path, request).await?;
        Ok(value)
    }

    async fn execute<T>(&self, path: &str, request: reqwest::RequestBuilder) -> Result<(u16, T)>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::signaling(format!("{} timed out: {}", path, e))
            } else {
                Error::signaling(format!("{} request failed: {}", path, e))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::signaling_status(status.as_u16(), format!("Failed to read response: {}", e))
        })?;

        debug!(path, status = status.as_u16(), "relay response");

        let value = check_relay_response(status.as_u16(), &body).map_err(|e| {
            warn!(
                path,
                status = status.as_u16(),
                reason = status.canonical_reason().unwrap_or("Unknown"),
                "relay call failed: {}",
                e
            );
            e
        })?;

        let parsed = serde_json::from_value(value).map_err(|e| {
            Error::signaling_status(status.as_u16(), format!("Failed to parse response: {}", e))
        })?;
        Ok((status.as_u16(), parsed))
    }
}

/// reqwest-backed [`Signaling`] implementation
#[cfg(feature = "client")]
#[derive(Debug, Clone)]
pub struct RelaySignalingClient {
    http: RelayHttp,
    trigger: String,
}

#[cfg(feature = "client")]
impl RelaySignalingClient {
    /// Create a client for the relay at `config.relay_url`
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            http: RelayHttp::new(config)?,
            trigger: config.connect_trigger.clone(),
        })
    }
}

#[cfg(feature = "client")]
#[async_trait]
impl Signaling for RelaySignalingClient {
    async fn initiate(&self) -> Result<StreamOffer> {
        let request = InitiateRequest {
            trigger: self.trigger.clone(),
        };
        let (status, response): (u16, InitiateResponse) = self
            .http
            .post_json_with_status(endpoints::INITIATE, &request)
            .await?;
        let offer = response.into_offer_with_status(Some(status))?;

        debug!(
            stream_id = %offer.credentials.stream_id,
            ice_servers = offer.ice_servers.len(),
            "stream initiated"
        );

        Ok(offer)
    }

    async fn submit_answer(
        &self,
        credentials: &StreamCredentials,
        answer: &SessionDescription,
    ) -> Result<ProviderAck> {
        let request = SubmitAnswerRequest {
            stream_id: credentials.stream_id.clone(),
            session_token: credentials.session_token.clone(),
            answer: answer.clone(),
        };
        self.http.post_json(endpoints::SUBMIT_ANSWER, &request).await
    }

    async fn request_talk(
        &self,
        credentials: &StreamCredentials,
        text: &str,
    ) -> Result<ProviderAck> {
        if text.trim().is_empty() {
            return Err(Error::signaling("talk text must not be empty"));
        }

        let request = TalkRequest {
            stream_id: credentials.stream_id.clone(),
            session_token: credentials.session_token.clone(),
            text: text.to_string(),
        };
        self.http.post_json(endpoints::START_TALK, &request).await
    }

    async fn destroy_session(&self, credentials: &StreamCredentials) -> Result<()> {
        let request = DestroyRequest {
            stream_id: credentials.stream_id.clone(),
            session_token: credentials.session_token.clone(),
        };
        let _: ProviderAck = self.http.post_json(endpoints::DESTROY, &request).await?;
        Ok(())
    }
}
