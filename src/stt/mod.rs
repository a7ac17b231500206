//! Speech-to-text collaborator.
//!
//! Each region has its own transcription model behind its own endpoint.
//! [`HttpTranscriber`] uploads the clip as `multipart/form-data` (field
//! `file`) and reads the `text` field of the JSON answer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::config::{DEFAULT_REGION, SttConfig};
use crate::error::{CompanionError, Result};

const SERVICE: &str = "stt";

/// An uploaded voice recording.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// A WAV clip named `voice.wav`.
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "voice.wav", "audio/wav")
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, region: &str, clip: &AudioClip) -> Result<String>;
}

/// Utterance substituted for a failed transcription.
///
/// An HTTP status failure names the status; anything else is generic.
pub fn failure_text(err: &CompanionError) -> String {
    match err {
        CompanionError::Collaborator { message, .. } if message.starts_with("HTTP ") => {
            format!("ASR 호출 실패: {}", &message["HTTP ".len()..])
        }
        _ => "ASR 호출 중 오류 발생".to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

/// Region-routed HTTP transcription client.
#[derive(Debug)]
pub struct HttpTranscriber {
    config: SttConfig,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(config: SttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CompanionError::Config(format!("stt client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Endpoint for `region`, falling back to `std`.
    pub fn endpoint(&self, region: &str) -> Result<&str> {
        self.config
            .endpoints
            .get(&region.to_lowercase())
            .or_else(|| self.config.endpoints.get(DEFAULT_REGION))
            .map(String::as_str)
            .ok_or_else(|| CompanionError::Config("stt: no endpoint for `std`".into()))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, region: &str, clip: &AudioClip) -> Result<String> {
        let endpoint = self.endpoint(region)?;
        debug!(region, endpoint, bytes = clip.bytes.len(), "transcription request");

        let part = Part::bytes(clip.bytes.clone())
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime_type)
            .map_err(|e| CompanionError::Validation(format!("audio mime type: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(endpoint)
            .multipart(form)
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

        let body = response
            .text()
            .await
            .map_err(|e| CompanionError::collaborator(SERVICE, format!("read body: {e}")))?;
        // Some servers answer with the bare transcript instead of JSON.
        let text = match serde_json::from_str::<TranscriptionResponse>(&body) {
            Ok(parsed) => parsed.text.unwrap_or_default(),
            Err(_) => body,
        };
        Ok(text.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> SttConfig {
        let mut config = SttConfig::default();
        config
            .endpoints
            .insert("std".into(), format!("{}/std/transcribe", server.uri()));
        config
            .endpoints
            .insert("gs".into(), format!("{}/gs/transcribe", server.uri()));
        config
    }

    #[tokio::test]
    async fn routes_by_region_and_reads_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gs/transcribe"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": " 밥 묵었나 "})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stt = HttpTranscriber::new(config_for(&server)).unwrap();
        let text = stt.transcribe("GS", &AudioClip::wav(vec![0; 16])).await.unwrap();
        assert_eq!(text, "밥 묵었나");
    }

    #[tokio::test]
    async fn unknown_region_falls_back_to_std() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/std/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "안녕"})))
            .expect(1)
            .mount(&server)
            .await;

        let stt = HttpTranscriber::new(config_for(&server)).unwrap();
        assert_eq!(stt.transcribe("gw", &AudioClip::wav(vec![1])).await.unwrap(), "안녕");
    }

    #[tokio::test]
    async fn http_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let stt = HttpTranscriber::new(config_for(&server)).unwrap();
        let err = stt.transcribe("std", &AudioClip::wav(vec![1])).await.unwrap_err();
        assert_eq!(failure_text(&err), "ASR 호출 실패: 503");
    }

    #[test]
    fn other_failures_use_generic_text() {
        assert_eq!(failure_text(&CompanionError::Timeout("stt")), "ASR 호출 중 오류 발생");
    }

    #[test]
    fn missing_std_endpoint_is_config_error() {
        let stt = HttpTranscriber::new(SttConfig {
            endpoints: Default::default(),
            timeout_secs: 1,
        })
        .unwrap();
        assert!(matches!(stt.endpoint("std"), Err(CompanionError::Config(_))));
    }
}
