//! Configuration types for the companion backend.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use hyodo_search::SearchConfig;

/// Region code used when a request carries none.
pub const DEFAULT_REGION: &str = "std";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// SQLite database location.
    pub storage: StorageConfig,
    /// Conversation behaviour (history size, region, timeouts).
    pub chat: ChatConfig,
    /// Language model endpoint.
    pub llm: LlmConfig,
    /// Speech-to-text endpoints per region.
    pub stt: SttConfig,
    /// Sentiment classifier endpoint.
    pub sentiment: SentimentConfig,
    /// Text-to-speech endpoint and voices.
    pub tts: TtsConfig,
    /// Web search credentials and query shaping.
    pub search: SearchConfig,
    /// Alarm delivery and background sweeps.
    pub scheduler: SchedulerConfig,
    /// Persona/dialect/emotion prompt tables.
    pub persona: PersonaConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("hyodo");
        Self {
            database_path: root.join("hyodo.db"),
        }
    }
}

/// Conversation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of most-recent turns placed in the prompt and returned to the client.
    pub history_limit: usize,
    /// Minimum number of recent rows fetched before trimming to `history_limit`.
    pub history_window: usize,
    /// Region code for new sessions when the request has none.
    pub default_region: String,
    /// Use the senior companion persona instead of the generic assistant.
    pub senior_friendly: bool,
    /// Upper bound for any single collaborator call.
    pub collaborator_timeout_secs: u64,
    /// Presence of any of these terms triggers a web search before replying.
    pub search_keywords: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            history_window: 50,
            default_region: DEFAULT_REGION.to_owned(),
            senior_friendly: true,
            collaborator_timeout_secs: 20,
            search_keywords: [
                "복지", "혜택", "지원금", "정책", "센터", "추천", "어디", "찾아줘", "알려줘",
                "병원", "약국", "뉴스", "정보", "어떻게",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API origin, e.g. `https://api.openai.com`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature for conversational replies.
    pub temperature: f64,
    /// Reply token cap.
    pub max_tokens: u32,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            temperature: 0.7,
            max_tokens: 600,
            timeout_secs: 30,
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Region code → transcription endpoint. `std` is the fallback.
    pub endpoints: BTreeMap<String, String>,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        let endpoints = [
            ("std", "http://localhost:9001/transcribe"),
            ("gs", "http://localhost:9002/transcribe"),
            ("jl", "http://localhost:9003/transcribe"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
        Self {
            endpoints,
            timeout_secs: 30,
        }
    }
}

/// Sentiment classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    /// URL accepting `{"text": ..}` and answering `{"emotion": ..}`.
    pub endpoint: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/emotion/analyze".to_owned(),
            timeout_secs: 5,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Disable to skip synthesis entirely.
    pub enabled: bool,
    /// API origin, e.g. `https://api.openai.com`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Speech model identifier.
    pub model: String,
    /// Region code → voice name.
    pub voices: BTreeMap<String, String>,
    /// Voice for regions without an entry.
    pub default_voice: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        let voices = [("gs", "onyx"), ("jl", "shimmer")]
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Self {
            enabled: true,
            base_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "tts-1".to_owned(),
            voices,
            default_voice: "alloy".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// Which transport delivers due alarms. Exactly one is active per deployment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmDelivery {
    /// Clients poll for their own due alarms; the preference gate applies.
    #[default]
    Poll,
    /// A server-side loop sweeps all users on a fixed period.
    Sweep,
}

impl AlarmDelivery {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Sweep => "sweep",
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Active alarm delivery path.
    pub delivery: AlarmDelivery,
    /// Period of the alarm sweep in seconds.
    pub tick_interval_secs: u64,
    /// Period of the verification-code expiry sweep in seconds.
    pub verification_sweep_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delivery: AlarmDelivery::Poll,
            tick_interval_secs: 60,
            verification_sweep_secs: 60,
        }
    }
}

/// Persona table overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// TOML file replacing the built-in persona tables.
    pub tables_path: Option<PathBuf>,
}

impl CompanionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::CompanionError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CompanionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/hyodo/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/hyodo-config"))
            .join("hyodo")
            .join("config.toml")
    }
}
