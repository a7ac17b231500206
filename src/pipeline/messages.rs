//! Request and response types for one conversational turn.

use serde::Serialize;

use crate::command::CommandAction;
use crate::emotion::Emotion;
use crate::store::Message;
use crate::stt::AudioClip;

/// What the user sent.
#[derive(Debug, Clone)]
pub enum TurnInput {
    Text(String),
    Voice(AudioClip),
}

/// One inbound turn, already authenticated by the host.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: i64,
    /// Continue this session; `None` starts a new one.
    pub session_id: Option<i64>,
    /// Region override; updates an existing session in place.
    pub region: Option<String>,
    pub input: TurnInput,
}

impl TurnRequest {
    pub fn text(user_id: i64, text: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id: None,
            region: None,
            input: TurnInput::Text(text.into()),
        }
    }

    pub fn voice(user_id: i64, clip: AudioClip) -> Self {
        Self {
            user_id,
            session_id: None,
            region: None,
            input: TurnInput::Voice(clip),
        }
    }

    pub fn in_session(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Result of a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: i64,
    /// Session title, possibly set by this turn.
    pub title: Option<String>,
    pub region: String,
    /// The utterance as processed (the transcript for voice input).
    pub utterance: String,
    pub emotion: Emotion,
    pub action: &'static str,
    pub reply: String,
    /// Most recent turns, oldest first, including this exchange.
    pub history: Vec<Message>,
    /// Playable audio reference, or a `TTS 오류` placeholder.
    pub audio: Option<String>,
}

/// Turn states, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Received,
    Transcribed,
    Scored,
    Classified(CommandAction),
    ExecutingCommand,
    GeneratingReply,
    Titled,
    Logged,
    Synthesized,
    Responded,
}

impl TurnStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Transcribed => "transcribed",
            Self::Scored => "scored",
            Self::Classified(_) => "classified",
            Self::ExecutingCommand => "executing_command",
            Self::GeneratingReply => "generating_reply",
            Self::Titled => "titled",
            Self::Logged => "logged",
            Self::Synthesized => "synthesized",
            Self::Responded => "responded",
        }
    }
}
