//! Relay configuration
//!
//! Loaded from command-line arguments with environment variable fallbacks.

use crate::error::{RelayError, RelayResult};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default system instruction for the text generation model
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "Anda adalah AI asisten yang menjawab pertanyaan \
pengguna secara akurat dan sedetail mungkin. Jangan menambahkan asumsi pribadi yang tidak \
didukung. Selalu berikan respons dalam Bahasa Indonesia yang baik, jelas, dan mudah dipahami.";

/// Command-line arguments of the relay server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "AvatarLink relay backend", long_about = None)]
pub struct RelayArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000", env = "RELAY_BIND_ADDRESS")]
    pub bind_address: String,

    /// Avatar provider API key (sent as Basic authorization)
    #[arg(long, env = "PROVIDER_API_KEY", hide_env_values = true)]
    pub provider_api_key: Option<String>,

    /// Avatar provider REST base URL
    #[arg(long, default_value = "https://api.d-id.com", env = "PROVIDER_BASE_URL")]
    pub provider_base_url: String,

    /// Source image of the avatar
    #[arg(
        long,
        default_value = "https://d-id-public-bucket.s3.us-west-2.amazonaws.com/alice.jpg",
        env = "AVATAR_IMAGE_URL"
    )]
    pub avatar_image_url: String,

    /// Text-to-speech provider used by the avatar
    #[arg(long, default_value = "microsoft", env = "VOICE_PROVIDER")]
    pub voice_provider: String,

    /// Voice used by the avatar
    #[arg(long, default_value = "id-ID-GadisNeural", env = "VOICE_ID")]
    pub voice_id: String,

    /// Text generation API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Text generation model
    #[arg(long, default_value = "gemini-2.0-flash-001", env = "GEMINI_MODEL")]
    pub gemini_model: String,

    /// Text generation REST base URL
    #[arg(
        long,
        default_value = "https://generativelanguage.googleapis.com",
        env = "GEMINI_BASE_URL"
    )]
    pub gemini_base_url: String,

    /// System instruction for the text generation model
    #[arg(long, default_value = DEFAULT_SYSTEM_INSTRUCTION, env = "SYSTEM_INSTRUCTION")]
    pub system_instruction: String,

    /// Speech-to-text API key (falls back to the text generation key)
    #[arg(long, env = "SPEECH_API_KEY", hide_env_values = true)]
    pub speech_api_key: Option<String>,

    /// Speech-to-text REST base URL
    #[arg(long, default_value = "https://speech.googleapis.com", env = "SPEECH_BASE_URL")]
    pub speech_base_url: String,

    /// Transcription language
    #[arg(long, default_value = "id-ID", env = "STT_LANGUAGE")]
    pub stt_language: String,

    /// Prompt used to generate the connect greeting
    #[arg(
        long,
        default_value = "Berikan sapaan singkat untuk memulai percakapan.",
        env = "GREETING_PROMPT"
    )]
    pub greeting_prompt: String,

    /// Greeting used when generation fails
    #[arg(
        long,
        default_value = "Halo! Koneksi sedang disiapkan. Ada yang bisa saya bantu?",
        env = "FALLBACK_GREETING"
    )]
    pub fallback_greeting: String,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 30, env = "RELAY_REQUEST_TIMEOUT")]
    pub request_timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long, env = "RELAY_LOG_JSON")]
    pub log_json: bool,
}

/// Voice settings for talk requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub provider: String,
    pub voice_id: String,
}

/// Validated relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind_address: SocketAddr,
    #[serde(skip_serializing)]
    pub provider_api_key: Option<String>,
    pub provider_base_url: String,
    pub avatar_image_url: String,
    pub voice: VoiceConfig,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub system_instruction: String,
    #[serde(skip_serializing)]
    pub speech_api_key: Option<String>,
    pub speech_base_url: String,
    pub stt_language: String,
    pub greeting_prompt: String,
    pub fallback_greeting: String,
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            provider_api_key: None,
            provider_base_url: "https://api.d-id.com".to_string(),
            avatar_image_url: "https://d-id-public-bucket.s3.us-west-2.amazonaws.com/alice.jpg"
                .to_string(),
            voice: VoiceConfig {
                provider: "microsoft".to_string(),
                voice_id: "id-ID-GadisNeural".to_string(),
            },
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash-001".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            speech_api_key: None,
            speech_base_url: "https://speech.googleapis.com".to_string(),
            stt_language: "id-ID".to_string(),
            greeting_prompt: "Berikan sapaan singkat untuk memulai percakapan.".to_string(),
            fallback_greeting: "Halo! Koneksi sedang disiapkan. Ada yang bisa saya bantu?"
                .to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl TryFrom<RelayArgs> for RelayConfig {
    type Error = RelayError;

    fn try_from(args: RelayArgs) -> RelayResult<Self> {
        let bind_address = args.bind_address.parse().map_err(|e| {
            RelayError::NotConfigured(format!(
                "invalid bind address {}: {}",
                args.bind_address, e
            ))
        })?;

        let config = Self {
            bind_address,
            provider_api_key: non_blank(args.provider_api_key),
            provider_base_url: args.provider_base_url,
            avatar_image_url: args.avatar_image_url,
            voice: VoiceConfig {
                provider: args.voice_provider,
                voice_id: args.voice_id,
            },
            gemini_api_key: non_blank(args.gemini_api_key),
            gemini_model: args.gemini_model,
            gemini_base_url: args.gemini_base_url,
            system_instruction: args.system_instruction,
            speech_api_key: non_blank(args.speech_api_key),
            speech_base_url: args.speech_base_url,
            stt_language: args.stt_language,
            greeting_prompt: args.greeting_prompt,
            fallback_greeting: args.fallback_greeting,
            request_timeout_secs: args.request_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RelayConfig {
    /// Validate configuration
    ///
    /// Missing API keys are not validation errors: the routes that need them
    /// report the missing credential per request.
    pub fn validate(&self) -> RelayResult<()> {
        for (name, url) in [
            ("provider_base_url", &self.provider_base_url),
            ("gemini_base_url", &self.gemini_base_url),
            ("speech_base_url", &self.speech_base_url),
            ("avatar_image_url", &self.avatar_image_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(RelayError::NotConfigured(format!(
                    "{} must start with http:// or https:// (got {})",
                    name, url
                )));
            }
        }

        if self.voice.provider.trim().is_empty() || self.voice.voice_id.trim().is_empty() {
            return Err(RelayError::NotConfigured(
                "voice provider and voice id must not be empty".to_string(),
            ));
        }

        if self.gemini_model.trim().is_empty() {
            return Err(RelayError::NotConfigured(
                "gemini_model must not be empty".to_string(),
            ));
        }

        if self.fallback_greeting.trim().is_empty() {
            return Err(RelayError::NotConfigured(
                "fallback_greeting must not be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(RelayError::NotConfigured(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Key for speech-to-text, falling back to the generation key
    pub fn speech_key(&self) -> Option<&str> {
        self.speech_api_key
            .as_deref()
            .or(self.gemini_api_key.as_deref())
    }
}
