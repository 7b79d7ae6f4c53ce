//! Agent backends: text generation and speech-to-text

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Produces the agent's reply text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> RelayResult<String>;
}

/// Turns recorded audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// `Ok(None)` when the audio produced no transcript
    async fn transcribe(&self, audio: Bytes) -> RelayResult<Option<String>>;
}

// ----------------------------------------------------------------------------
// Gemini generateContent
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Gemini REST text generation
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_instruction: String,
}

impl GeminiClient {
    pub fn new(config: &RelayConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: config.gemini_api_key.clone(),
            system_instruction: config.system_instruction.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> RelayResult<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RelayError::NotConfigured("GEMINI_API_KEY is not set".into()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": self.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        info!(model = %self.model, prompt_chars = prompt.len(), "requesting agent response");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "generation request failed");
            return Err(RelayError::Agent {
                message: format!("Text generation failed: HTTP {}", status.as_u16()),
                user_text: None,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed.text().ok_or_else(|| RelayError::Agent {
            message: "Text generation returned no content".to_string(),
            user_text: None,
        })?;
        debug!(reply_chars = text.len(), "agent response generated");
        Ok(text)
    }
}

// ----------------------------------------------------------------------------
// Google Speech-to-Text speech:recognize
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

impl RecognizeResponse {
    /// Best alternative of each result, joined with spaces
    fn transcript(&self) -> Option<String> {
        let joined = self
            .results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

/// Google Speech-to-Text REST client
#[derive(Debug, Clone)]
pub struct GoogleSpeechClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    language: String,
}

impl GoogleSpeechClient {
    pub fn new(config: &RelayConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.speech_base_url.trim_end_matches('/').to_string(),
            api_key: config.speech_key().map(str::to_string),
            language: config.stt_language.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for GoogleSpeechClient {
    async fn transcribe(&self, audio: Bytes) -> RelayResult<Option<String>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RelayError::NotConfigured("SPEECH_API_KEY is not set".into()))?;

        let payload = json!({
            "config": {
                "languageCode": self.language,
                "enableAutomaticPunctuation": true,
            },
            "audio": {
                "content": base64::engine::general_purpose::STANDARD.encode(&audio),
            },
        });

        info!(audio_bytes = audio.len(), language = %self.language, "transcribing audio");
        let response = self
            .client
            .post(format!("{}/v1/speech:recognize", self.base_url))
            .header("x-goog-api-key", key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "speech recognition failed");
            return Err(RelayError::Transcription(format!(
                "speech recognition failed: HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: RecognizeResponse = response.json().await?;
        let transcript = parsed.transcript();
        match &transcript {
            Some(text) => debug!(transcript = %text, "transcription finished"),
            None => warn!("no transcription results"),
        }
        Ok(transcript)
    }
}
