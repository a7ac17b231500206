//! Shared fixtures for integration tests.
//!
//! Every external collaborator is replaced by an in-process fake so the
//! pipeline can be driven deterministically against a real SQLite file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use hyodo::calendar::{CalendarService, SqliteCalendarStore};
use hyodo::config::{AlarmDelivery, ChatConfig};
use hyodo::emotion::Emotion;
use hyodo::error::{CompanionError, Result};
use hyodo::identity::SqliteIdentityStore;
use hyodo::llm::{ChatMessage, CompletionMode, LanguageModel};
use hyodo::personality::PersonaTables;
use hyodo::scheduler::AlarmDispatcher;
use hyodo::search::SearchProvider;
use hyodo::sentiment::SentimentAnalyzer;
use hyodo::store::Database;
use hyodo::stt::{AudioClip, Transcriber};
use hyodo::tts::SpeechSynthesizer;
use hyodo::ReplyPipeline;
use hyodo_search::SearchResult;

pub(crate) const ELDER: i64 = 1;
pub(crate) const GUARDIAN: i64 = 2;
pub(crate) const STRANGER: i64 = 3;

/// 2025-01-01 (a Wednesday) at `h:m`.
pub(crate) fn jan1(h: u32, m: u32) -> NaiveDateTime {
    at(1, h, m)
}

pub(crate) fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .expect("valid test timestamp")
}

/// Language model fake: command JSON is scripted per call, conversation
/// replies echo a fixed string, and every prompt is recorded.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    commands: Mutex<VecDeque<String>>,
    pub(crate) fail_conversation: bool,
    conversations: Mutex<Vec<Vec<ChatMessage>>>,
    title_calls: Mutex<usize>,
}

impl ScriptedModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_conversation() -> Self {
        Self {
            fail_conversation: true,
            ..Self::default()
        }
    }

    /// Queue the classifier output for the next turn.
    pub(crate) fn script(&self, json: &str) {
        self.commands.lock().unwrap().push_back(json.to_owned());
    }

    /// Prompts sent for conversational replies, in call order.
    pub(crate) fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.conversations.lock().unwrap().clone()
    }

    pub(crate) fn title_calls(&self) -> usize {
        *self.title_calls.lock().unwrap()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage], mode: CompletionMode) -> Result<String> {
        match mode {
            CompletionMode::CommandJson => Ok(self
                .commands
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| r#"{"action":"NONE"}"#.to_owned())),
            CompletionMode::Title => {
                *self.title_calls.lock().unwrap() += 1;
                Ok("\"병원 예약\"".to_owned())
            }
            CompletionMode::Conversation => {
                self.conversations.lock().unwrap().push(messages.to_vec());
                if self.fail_conversation {
                    Err(CompanionError::collaborator("llm", "HTTP 500: upstream down"))
                } else {
                    Ok("네, 잘 알겠어요.".to_owned())
                }
            }
        }
    }
}

/// Sentiment fake returning one fixed emotion.
pub(crate) struct FixedSentiment(pub(crate) Emotion);

#[async_trait]
impl SentimentAnalyzer for FixedSentiment {
    async fn analyze(&self, _text: &str) -> Result<Emotion> {
        Ok(self.0)
    }
}

/// Sentiment fake whose service is down.
pub(crate) struct FailingSentiment;

#[async_trait]
impl SentimentAnalyzer for FailingSentiment {
    async fn analyze(&self, _text: &str) -> Result<Emotion> {
        Err(CompanionError::collaborator("sentiment", "HTTP 502: bad gateway"))
    }
}

/// A collaborator that accepts the request and never answers.
pub(crate) struct Hanging;

#[async_trait]
impl LanguageModel for Hanging {
    async fn complete(&self, _messages: &[ChatMessage], _mode: CompletionMode) -> Result<String> {
        std::future::pending().await
    }
}

#[async_trait]
impl SentimentAnalyzer for Hanging {
    async fn analyze(&self, _text: &str) -> Result<Emotion> {
        std::future::pending().await
    }
}

/// Transcriber fake that records the region it was asked for.
pub(crate) struct FixedTranscript {
    pub(crate) text: Option<String>,
    pub(crate) regions: Mutex<Vec<String>>,
}

impl FixedTranscript {
    pub(crate) fn ok(text: &str) -> Self {
        Self {
            text: Some(text.to_owned()),
            regions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            text: None,
            regions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transcriber for FixedTranscript {
    async fn transcribe(&self, region: &str, _clip: &AudioClip) -> Result<String> {
        self.regions.lock().unwrap().push(region.to_owned());
        self.text
            .clone()
            .ok_or_else(|| CompanionError::collaborator("stt", "HTTP 503"))
    }
}

/// Speech fake producing a tiny data URI.
pub(crate) struct FakeSpeech {
    pub(crate) fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str, region: &str) -> Result<String> {
        if self.fail {
            return Err(CompanionError::collaborator("tts", "HTTP 429: quota"));
        }
        Ok(format!("data:audio/mp3;base64,{region}"))
    }
}

/// Search fake with a single canned result.
pub(crate) struct CannedSearch;

#[async_trait]
impl SearchProvider for CannedSearch {
    async fn search(&self, _query: &str) -> Vec<SearchResult> {
        vec![SearchResult {
            title: "기초연금 안내".to_owned(),
            description: "만 65세 이상 어르신께 지급합니다.".to_owned(),
            link: "https://example.org/pension".to_owned(),
        }]
    }
}

/// A pipeline over a temp-file database with one elder, their guardian and
/// an unrelated elder registered.
pub(crate) struct Harness {
    pub(crate) _dir: tempfile::TempDir,
    pub(crate) db: Database,
    pub(crate) model: Arc<ScriptedModel>,
    pub(crate) identity: Arc<SqliteIdentityStore>,
    pub(crate) store: Arc<SqliteCalendarStore>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_model(ScriptedModel::new())
    }

    pub(crate) fn with_model(model: ScriptedModel) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db = Database::open(&dir.path().join("hyodo.db")).expect("open database");
        let identity = Arc::new(SqliteIdentityStore::new(db.clone()));
        identity.register_member(ELDER, "할머니", jan1(0, 0)).unwrap();
        identity.register_guardian(GUARDIAN, "딸", ELDER, jan1(0, 0)).unwrap();
        identity.register_member(STRANGER, "이웃", jan1(0, 0)).unwrap();
        let store = Arc::new(SqliteCalendarStore::new(db.clone()));
        Self {
            _dir: dir,
            db,
            model: Arc::new(model),
            identity,
            store,
        }
    }

    pub(crate) fn pipeline(&self) -> ReplyPipeline {
        self.pipeline_with(ChatConfig::default())
    }

    pub(crate) fn pipeline_with(&self, chat: ChatConfig) -> ReplyPipeline {
        self.pipeline_over(
            self.model.clone(),
            Arc::new(FixedSentiment(Emotion::Neutral)),
            chat,
        )
    }

    /// A pipeline with caller-chosen model and sentiment collaborators.
    pub(crate) fn pipeline_over(
        &self,
        llm: Arc<dyn LanguageModel>,
        sentiment: Arc<dyn SentimentAnalyzer>,
        chat: ChatConfig,
    ) -> ReplyPipeline {
        let tables = PersonaTables::builtin().expect("built-in persona tables");
        ReplyPipeline::new(
            self.db.clone(),
            self.identity.clone(),
            CalendarService::new(self.store.clone()),
            llm,
            sentiment,
            Arc::new(tables),
            chat,
        )
    }

    pub(crate) fn dispatcher(&self, mode: AlarmDelivery) -> AlarmDispatcher {
        AlarmDispatcher::new(self.store.clone(), self.identity.clone(), mode)
    }
}
