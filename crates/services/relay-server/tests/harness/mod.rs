//! Relay Test Harness
//!
//! Scripted provider and agent backends plus helpers for driving the router
//! with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use avatarlink_relay::{
    build_router, AvatarProvider, CreatedStream, RelayConfig, RelayError, RelayResult,
    RelayState, TextGenerator, Transcriber,
};
use avatarlink_session::{IceServer, SessionDescription};
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const BOUNDARY: &str = "avatarlink-test-boundary";

/// A recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Create,
    Answer {
        stream_id: String,
        session_id: String,
        answer: SessionDescription,
    },
    Talk {
        stream_id: String,
        session_id: String,
        text: String,
    },
    Destroy {
        stream_id: String,
        session_id: String,
    },
}

pub struct MockProvider {
    pub created: Mutex<CreatedStream>,
    pub fail_with: Mutex<Option<(u16, String)>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(CreatedStream {
                id: Some("strm_relay".to_string()),
                session_id: Some("sess_relay".to_string()),
                offer: Some(SessionDescription::offer("v=0\r\n")),
                ice_servers: Some(vec![IceServer::new("stun:stun.example.com:3478")]),
            }),
            fail_with: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: ProviderCall) -> RelayResult<Value> {
        self.calls.lock().push(call);
        match self.fail_with.lock().clone() {
            Some((status, body)) => Err(RelayError::Provider {
                status: Some(status),
                message: format!("Failed: HTTP {} {}", status, body),
            }),
            None => Ok(json!({ "status": "ok" })),
        }
    }
}

#[async_trait]
impl AvatarProvider for MockProvider {
    async fn create_stream(&self) -> RelayResult<CreatedStream> {
        self.record(ProviderCall::Create)?;
        Ok(self.created.lock().clone())
    }

    async fn submit_answer(
        &self,
        stream_id: &str,
        session_id: &str,
        answer: &SessionDescription,
    ) -> RelayResult<Value> {
        self.record(ProviderCall::Answer {
            stream_id: stream_id.to_string(),
            session_id: session_id.to_string(),
            answer: answer.clone(),
        })
    }

    async fn start_talk(
        &self,
        stream_id: &str,
        session_id: &str,
        text: &str,
    ) -> RelayResult<Value> {
        self.record(ProviderCall::Talk {
            stream_id: stream_id.to_string(),
            session_id: session_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn destroy_stream(&self, stream_id: &str, session_id: &str) -> RelayResult<Value> {
        self.record(ProviderCall::Destroy {
            stream_id: stream_id.to_string(),
            session_id: session_id.to_string(),
        })
    }
}

/// Generator returning a fixed reply, or failing
pub struct MockGenerator {
    pub reply: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Mutex::new(Some(reply.to_string())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> RelayResult<String> {
        self.prompts.lock().push(prompt.to_string());
        self.reply.lock().clone().ok_or_else(|| RelayError::Agent {
            message: "Text generation failed: HTTP 503".to_string(),
            user_text: None,
        })
    }
}

/// Transcriber returning a fixed transcript
pub struct MockTranscriber {
    pub transcript: Mutex<Option<String>>,
    received: Mutex<Vec<Bytes>>,
}

impl MockTranscriber {
    pub fn hearing(transcript: Option<&str>) -> Self {
        Self {
            transcript: Mutex::new(transcript.map(str::to_string)),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: Bytes) -> RelayResult<Option<String>> {
        self.received.lock().push(audio);
        Ok(self.transcript.lock().clone())
    }
}

/// Router wired to scripted backends
pub struct RelayHarness {
    pub provider: Arc<MockProvider>,
    pub generator: Arc<MockGenerator>,
    pub transcriber: Arc<MockTranscriber>,
    pub router: Router,
}

impl RelayHarness {
    pub fn new() -> Self {
        Self::build(
            MockGenerator::replying("Halo, ada yang bisa dibantu?"),
            MockTranscriber::hearing(Some("halo dari audio")),
            Some("test-key"),
        )
    }

    pub fn build(
        generator: MockGenerator,
        transcriber: MockTranscriber,
        provider_api_key: Option<&str>,
    ) -> Self {
        let provider = Arc::new(MockProvider::new());
        let generator = Arc::new(generator);
        let transcriber = Arc::new(transcriber);

        let config = RelayConfig {
            provider_api_key: provider_api_key.map(str::to_string),
            ..Default::default()
        };
        let state = RelayState {
            config: Arc::new(config),
            provider: provider.clone(),
            generator: generator.clone(),
            transcriber: transcriber.clone(),
        };

        Self {
            provider,
            generator,
            transcriber,
            router: build_router(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        read_json(response).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(&self, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

pub async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Multipart body with one text field
pub fn text_form(name: &str, value: &str) -> Vec<u8> {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n--{b}--\r\n",
        b = BOUNDARY
    )
    .into_bytes()
}

/// Multipart body with one file field
pub fn file_form(name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
        b = BOUNDARY
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}
