//! Sentiment collaborator.
//!
//! The classifier service accepts `{"text": ..}` and answers
//! `{"emotion": ..}` with a Korean label or a numeric class code. Labels are
//! normalised through [`Emotion::from_label`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;

use crate::config::SentimentConfig;
use crate::emotion::Emotion;
use crate::error::{CompanionError, Result};

const SERVICE: &str = "sentiment";

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    /// Blank input is neutral by contract.
    async fn analyze(&self, text: &str) -> Result<Emotion>;
}

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    emotion: Option<String>,
}

/// HTTP sentiment client.
#[derive(Debug)]
pub struct HttpSentimentAnalyzer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSentimentAnalyzer {
    pub fn new(config: &SentimentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CompanionError::Config(format!("sentiment client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }
}

#[async_trait]
impl SentimentAnalyzer for HttpSentimentAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Emotion> {
        if text.trim().is_empty() {
            return Ok(Emotion::Neutral);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
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

        let parsed: SentimentResponse = response
            .json()
            .await
            .map_err(|e| CompanionError::collaborator(SERVICE, format!("invalid response: {e}")))?;
        let label = parsed
            .emotion
            .ok_or_else(|| CompanionError::collaborator(SERVICE, "response has no emotion"))?;
        let emotion = Emotion::from_label(&label);
        trace!(label = %label, emotion = emotion.key(), "sentiment scored");
        Ok(emotion)
    }
}
