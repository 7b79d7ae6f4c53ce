//! Relay HTTP server
//!
//! Endpoints:
//! - POST /initiate_stream - Create a provider stream, return offer + greeting
//! - POST /submit_sdp_answer - Forward the client's SDP answer
//! - POST /start_talk_stream - Make the avatar speak text
//! - POST /destroy_session - Close the provider stream
//! - POST /get_agent_response - Text or audio input → agent reply (multipart)
//! - GET /health - Health check

use crate::agent::{GeminiClient, GoogleSpeechClient, TextGenerator, Transcriber};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::provider::{AvatarProvider, DidProvider};
use avatarlink_session::signaling::{
    endpoints, AgentResponseBody, InitiateResponse, ProviderAck, AUDIO_FIELD, CONNECT_TRIGGER,
    TEXT_FIELD,
};
use avatarlink_session::SessionDescription;
use axum::{
    extract::{multipart::Multipart, rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on uploaded audio
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Relay state shared across handlers
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub provider: Arc<dyn AvatarProvider>,
    pub generator: Arc<dyn TextGenerator>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl RelayState {
    /// State backed by the real provider and agent clients
    pub fn from_config(config: RelayConfig) -> RelayResult<Self> {
        Ok(Self {
            provider: Arc::new(DidProvider::new(&config)?),
            generator: Arc::new(GeminiClient::new(&config)?),
            transcriber: Arc::new(GoogleSpeechClient::new(&config)?),
            config: Arc::new(config),
        })
    }
}

/// Build the router with all endpoints
pub fn build_router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(endpoints::INITIATE, post(initiate_stream_handler))
        .route(endpoints::SUBMIT_ANSWER, post(submit_answer_handler))
        .route(endpoints::START_TALK, post(start_talk_handler))
        .route(endpoints::DESTROY, post(destroy_session_handler))
        .route(endpoints::AGENT_RESPONSE, post(agent_response_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
}

/// Relay HTTP server
pub struct RelayServer {
    bind_address: SocketAddr,
    state: RelayState,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let bind_address = config.bind_address;
        Ok(Self {
            bind_address,
            state: RelayState::from_config(config)?,
        })
    }

    pub fn with_state(bind_address: SocketAddr, state: RelayState) -> Self {
        Self {
            bind_address,
            state,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_address).await?;
        info!("Relay listening on {}", listener.local_addr()?);

        if self.state.config.provider_api_key.is_none() {
            warn!("PROVIDER_API_KEY is not set, stream creation will fail");
        }

        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
    }
}

// Handler implementations

/// Health check endpoint
async fn health_handler() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Default, Deserialize)]
struct InitiateBody {
    #[serde(default)]
    trigger: Option<String>,
}

/// Stream fields as sent by clients; presence is checked per route
#[derive(Debug, Default, Deserialize)]
struct StreamBody {
    #[serde(default)]
    stream_id: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    answer: Option<SessionDescription>,
    #[serde(default)]
    text: Option<String>,
}

impl StreamBody {
    /// Trimmed stream id and session token, both required
    fn ids(&self) -> RelayResult<(&str, &str)> {
        let stream_id = required(self.stream_id.as_deref(), "stream_id")?;
        let session_token = required(self.session_token.as_deref(), "session_token")?;
        Ok((stream_id, session_token))
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> RelayResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::missing(field))
}

fn parse_json<T>(payload: Result<Json<T>, JsonRejection>) -> RelayResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| RelayError::BadRequest(format!("Invalid request body: {}", e.body_text())))
}

fn ack(status: &str, provider_response: serde_json::Value) -> Json<ProviderAck> {
    Json(ProviderAck {
        status: Some(status.to_string()),
        provider_response: Some(provider_response),
    })
}

async fn initiate_stream_handler(
    State(state): State<RelayState>,
    payload: Result<Json<InitiateBody>, JsonRejection>,
) -> RelayResult<Json<InitiateResponse>> {
    let body = parse_json(payload)?;
    if state.config.provider_api_key.is_none() {
        return Err(RelayError::NotConfigured(
            "Provider API key not configured.".to_string(),
        ));
    }

    let trigger = body
        .trigger
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(CONNECT_TRIGGER);
    let greeting = greeting_for(&state, trigger).await;

    let stream = state.provider.create_stream().await?;
    let (stream_id, session_token) = match (stream.id, stream.session_id) {
        (Some(id), Some(session)) if !id.trim().is_empty() && !session.trim().is_empty() => {
            (id, session)
        }
        _ => {
            warn!("provider stream creation response missing id or session_id");
            return Err(RelayError::Provider {
                status: None,
                message: "stream creation response incomplete".to_string(),
            });
        }
    };

    info!(stream_id = %stream_id, "provider stream created");
    Ok(Json(InitiateResponse {
        stream_id: Some(stream_id),
        session_token: Some(session_token),
        offer: stream.offer,
        ice_servers: stream.ice_servers,
        greeting: Some(greeting),
        error: None,
    }))
}

/// Generated greeting for a connect request, or the configured fallback
async fn greeting_for(state: &RelayState, trigger: &str) -> String {
    if trigger != CONNECT_TRIGGER {
        debug!(trigger, "unknown connect trigger, using fallback greeting");
        return state.config.fallback_greeting.clone();
    }

    match state.generator.generate(&state.config.greeting_prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => state.config.fallback_greeting.clone(),
        Err(e) => {
            warn!("Greeting generation failed, using fallback: {}", e);
            state.config.fallback_greeting.clone()
        }
    }
}

async fn submit_answer_handler(
    State(state): State<RelayState>,
    payload: Result<Json<StreamBody>, JsonRejection>,
) -> RelayResult<Json<ProviderAck>> {
    let body = parse_json(payload)?;
    let (stream_id, session_token) = body.ids()?;
    let answer = body
        .answer
        .as_ref()
        .filter(|a| !a.sdp.trim().is_empty())
        .ok_or_else(|| RelayError::missing("answer"))?;

    let response = state
        .provider
        .submit_answer(stream_id, session_token, answer)
        .await?;
    info!(stream_id, "SDP answer submitted");
    Ok(ack("sdp_answer_submitted", response))
}

async fn start_talk_handler(
    State(state): State<RelayState>,
    payload: Result<Json<StreamBody>, JsonRejection>,
) -> RelayResult<Json<ProviderAck>> {
    let body = parse_json(payload)?;
    let (stream_id, session_token) = body.ids()?;
    let text = required(body.text.as_deref(), "text")?;

    let response = state
        .provider
        .start_talk(stream_id, session_token, text)
        .await?;
    info!(stream_id, text_chars = text.len(), "talk stream started");
    Ok(ack("talk_stream_started", response))
}

async fn destroy_session_handler(
    State(state): State<RelayState>,
    payload: Result<Json<StreamBody>, JsonRejection>,
) -> RelayResult<Json<ProviderAck>> {
    let body = parse_json(payload)?;
    let (stream_id, session_token) = body.ids()?;

    let response = state
        .provider
        .destroy_stream(stream_id, session_token)
        .await?;
    info!(stream_id, "provider stream destroyed");
    Ok(ack("session_destroyed", response))
}

/// Input fields of an agent-response request
#[derive(Debug, Default)]
struct AgentInput {
    text: Option<String>,
    audio: Option<Bytes>,
}

async fn read_agent_input(mut multipart: Multipart) -> RelayResult<AgentInput> {
    let mut input = AgentInput::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(AUDIO_FIELD) => {
                let bytes = field.bytes().await.map_err(|e| {
                    RelayError::BadRequest(format!("Failed to read audio: {}", e))
                })?;
                input.audio = Some(bytes);
            }
            Some(TEXT_FIELD) => {
                let text = field.text().await.map_err(|e| {
                    RelayError::BadRequest(format!("Failed to read text: {}", e))
                })?;
                input.text = Some(text);
            }
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }
    Ok(input)
}

async fn agent_response_handler(
    State(state): State<RelayState>,
    multipart: Multipart,
) -> RelayResult<Json<AgentResponseBody>> {
    let input = read_agent_input(multipart).await?;

    // Audio wins when both fields are present
    let user_text = match (input.audio, input.text) {
        (Some(audio), _) => {
            let transcript = match state.transcriber.transcribe(audio).await {
                Ok(transcript) => transcript,
                Err(e) => {
                    warn!("Transcription failed: {}", e);
                    None
                }
            };
            transcript
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| RelayError::Transcription("Could not transcribe audio.".into()))?
        }
        (None, Some(text)) => text,
        (None, None) => return Err(RelayError::BadRequest("No input provided".to_string())),
    };

    if user_text.trim().is_empty() {
        return Err(RelayError::BadRequest("Input text is empty".to_string()));
    }

    match state.generator.generate(&user_text).await {
        Ok(reply) => Ok(Json(AgentResponseBody {
            agent_response_text: Some(reply),
            user_text: Some(user_text),
            error: None,
        })),
        Err(e) => {
            warn!("Agent response failed: {}", e);
            Err(RelayError::Agent {
                message: e.to_string(),
                user_text: Some(user_text),
            })
        }
    }
}
