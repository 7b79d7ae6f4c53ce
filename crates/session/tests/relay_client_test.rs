//! Relay HTTP client tests against a mock relay
//!
//! ```bash
//! cargo test -p avatarlink-session --features client --test relay_client_test
//! ```

#![cfg(feature = "client")]

mod harness;

use avatarlink_session::{
    AgentClient, AudioClip, Error, RelayAgentClient, RelaySignalingClient, SdpKind,
    SessionConfig, SessionDescription, Signaling, StreamCredentials, TurnInput,
};
use harness::init_logging;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> SessionConfig {
    // Trailing slash must not produce double slashes in endpoint URLs
    SessionConfig::default()
        .with_relay_url(format!("{}/", server.uri()))
        .with_request_timeout_secs(5)
}

fn credentials() -> StreamCredentials {
    StreamCredentials::new("strm_123", "sess_456")
}

// ============================================================================
// Signaling
// ============================================================================

#[tokio::test]
async fn test_initiate_sends_trigger_and_parses_offer() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/initiate_stream"))
        .and(body_json(json!({ "trigger": "SYSTEM_CONNECT_REQUEST" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stream_id": "strm_123",
            "session_token": "sess_456",
            "offer": { "type": "offer", "sdp": "v=0\r\n" },
            "ice_servers": [
                { "urls": "stun:stun.example.com" },
                { "urls": ["turn:turn.example.com:3478"], "username": "u", "credential": "p" }
            ],
            "greeting": "Halo!"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RelaySignalingClient::new(&config_for(&server)).unwrap();
    let offer = client.initiate().await.unwrap();

    assert_eq!(offer.credentials, credentials());
    assert_eq!(offer.offer.kind, SdpKind::Offer);
    assert_eq!(offer.ice_servers.len(), 2);
    assert_eq!(offer.ice_servers[0].urls, vec!["stun:stun.example.com".to_string()]);
    assert_eq!(offer.ice_servers[1].username.as_deref(), Some("u"));
    assert_eq!(offer.greeting.as_deref(), Some("Halo!"));
}

#[tokio::test]
async fn test_initiate_incomplete_payload() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/initiate_stream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stream_id": "strm_123",
            "offer": { "type": "offer", "sdp": "v=0\r\n" },
            "ice_servers": []
        })))
        .mount(&server)
        .await;

    let client = RelaySignalingClient::new(&config_for(&server)).unwrap();
    let err = client.initiate().await.unwrap_err();

    assert!(matches!(err, Error::SignalingError { .. }));
    assert_eq!(err.http_status(), Some(200));
    assert!(err.to_string().contains("missing: session_token"));
}

#[tokio::test]
async fn test_non_ok_status_carries_error_field() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/initiate_stream"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "error": "Provider unavailable" })),
        )
        .mount(&server)
        .await;

    let client = RelaySignalingClient::new(&config_for(&server)).unwrap();
    let err = client.initiate().await.unwrap_err();

    assert_eq!(err.http_status(), Some(503));
    assert_eq!(
        err.to_string(),
        "Signaling error (HTTP 503): Provider unavailable"
    );
}

#[tokio::test]
async fn test_submit_answer_request_shape() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit_sdp_answer"))
        .and(body_json(json!({
            "stream_id": "strm_123",
            "session_token": "sess_456",
            "answer": { "type": "answer", "sdp": "v=0\r\na=answer\r\n" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "provider_response": { "status": "ok" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RelaySignalingClient::new(&config_for(&server)).unwrap();
    let ack = client
        .submit_answer(
            &credentials(),
            &SessionDescription::answer("v=0\r\na=answer\r\n"),
        )
        .await
        .unwrap();

    assert_eq!(ack.status.as_deref(), Some("success"));
    assert!(ack.provider_response.is_some());
}

#[tokio::test]
async fn test_error_field_on_ok_status_fails_talk() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/start_talk_stream"))
        .and(body_json(json!({
            "stream_id": "strm_123",
            "session_token": "sess_456",
            "text": "Selamat pagi"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "stream expired" })),
        )
        .mount(&server)
        .await;

    let client = RelaySignalingClient::new(&config_for(&server)).unwrap();
    let err = client
        .request_talk(&credentials(), "Selamat pagi")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("stream expired"));
}

#[tokio::test]
async fn test_destroy_request_shape() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/destroy_session"))
        .and(body_json(json!({
            "stream_id": "strm_123",
            "session_token": "sess_456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RelaySignalingClient::new(&config_for(&server)).unwrap();
    client.destroy_session(&credentials()).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_relay_is_signaling_error() {
    init_logging();
    let config = SessionConfig::default()
        .with_relay_url("http://127.0.0.1:9")
        .with_request_timeout_secs(2);
    let client = RelaySignalingClient::new(&config).unwrap();

    let err = client.initiate().await.unwrap_err();
    assert!(matches!(err, Error::SignalingError { status: None, .. }));
}

// ============================================================================
// Agent
// ============================================================================

#[tokio::test]
async fn test_agent_text_input_is_multipart_field() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get_agent_response"))
        .and(body_string_contains("name=\"text_input\""))
        .and(body_string_contains("apa kabar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_response_text": "Kabar baik!",
            "user_text": "apa kabar"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let agent = RelayAgentClient::new(&config_for(&server)).unwrap();
    let reply = agent.respond(&TurnInput::text("apa kabar")).await.unwrap();

    assert_eq!(reply.agent_response_text, "Kabar baik!");
    assert_eq!(reply.user_text.as_deref(), Some("apa kabar"));
}

#[tokio::test]
async fn test_agent_audio_input_is_file_part() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get_agent_response"))
        .and(body_string_contains("name=\"audio_data\""))
        .and(body_string_contains("filename=\"recording.webm\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_response_text": "Saya dengar Anda.",
            "user_text": "halo"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let agent = RelayAgentClient::new(&config_for(&server)).unwrap();
    let clip = AudioClip::new(b"webm-bytes".to_vec(), "recording.webm", "audio/webm");
    let reply = agent.respond(&TurnInput::Audio(clip)).await.unwrap();

    assert_eq!(reply.user_text.as_deref(), Some("halo"));
}

#[tokio::test]
async fn test_agent_transcription_failure() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get_agent_response"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": "Could not transcribe audio." })),
        )
        .mount(&server)
        .await;

    let agent = RelayAgentClient::new(&config_for(&server)).unwrap();
    let clip = AudioClip::new(b"noise".to_vec(), "recording.webm", "audio/webm");
    let err = agent.respond(&TurnInput::Audio(clip)).await.unwrap_err();

    assert_eq!(err.http_status(), Some(400));
    assert!(err.to_string().contains("Could not transcribe audio."));
}
