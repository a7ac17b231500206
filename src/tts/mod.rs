//! Text-to-speech collaborator.
//!
//! [`OpenAiSpeech`] calls an OpenAI-compatible `/v1/audio/speech` endpoint
//! and returns the MP3 as a `data:` URI the client can play directly.
//! The dialect itself is not synthesised; the region only picks a voice.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tracing::debug;

use crate::config::TtsConfig;
use crate::error::{CompanionError, Result};

const SERVICE: &str = "tts";

/// Prefix of the placeholder returned instead of audio when synthesis fails.
pub const FAILURE_PREFIX: &str = "TTS 오류";

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and return a playable audio reference.
    async fn synthesize(&self, text: &str, region: &str) -> Result<String>;
}

/// Placeholder audio reference for a failed synthesis.
pub fn failure_text(err: &CompanionError) -> String {
    format!("{FAILURE_PREFIX}: {err}")
}

/// OpenAI-compatible speech client.
pub struct OpenAiSpeech {
    config: TtsConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSpeech")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiSpeech {
    pub fn new(config: TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CompanionError::Config(format!("tts client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn voice_for(&self, region: &str) -> &str {
        self.config
            .voices
            .get(&region.to_lowercase())
            .unwrap_or(&self.config.default_voice)
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, region: &str) -> Result<String> {
        if self.config.api_key.trim().is_empty() {
            return Err(CompanionError::Config("tts api key is not set".into()));
        }
        let voice = self.voice_for(region);
        debug!(region, voice, chars = text.chars().count(), "speech request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "input": text,
                "voice": voice,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompanionError::Timeout(SERVICE)
                } else {
                    CompanionError::collaborator(SERVICE, format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompanionError::collaborator(
                SERVICE,
                format!("HTTP {}", status.as_u16()),
            ));
        }
        let audio = response
            .bytes()
            .await
            .map_err(|e| CompanionError::collaborator(SERVICE, format!("read body: {e}")))?;
        if audio.is_empty() {
            return Err(CompanionError::collaborator(SERVICE, "empty audio"));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio);
        Ok(format!("data:audio/mp3;base64,{encoded}"))
    }
}
