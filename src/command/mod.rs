//! Command classification for calendar and alarm intents.
//!
//! Each utterance yields exactly one [`Command`]. Extraction is delegated to
//! the language model in JSON mode; the answer is treated as untrusted and
//! parsed defensively. Anything that does not parse into a known action
//! becomes [`Command::None`], so a confused model can never trigger a
//! deletion or a malformed insert.
//!
//! # Supported intents
//!
//! | Example utterance | Command |
//! |-------------------|---------|
//! | "내일 2시에 병원 예약 잡아줘" | `AddSchedule` |
//! | "오늘 일정 있어?" | `CheckSchedule` |
//! | "치과 예약 취소해" | `DeleteSchedule` |
//! | "알림 꺼줘" | `ToggleAlarm` |
//! | anything else | `None` |
//!
//! Missing or unparseable dates from the model are repaired with the
//! rule-based resolver in [`temporal`].

pub mod temporal;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, CompletionMode, LanguageModel};

/// A classified intent. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an event. Both fields may be missing and are validated on execution.
    AddSchedule {
        title: Option<String>,
        start: Option<NaiveDateTime>,
    },
    /// List the events of one day.
    CheckSchedule { date: Option<NaiveDate> },
    /// Delete the nearest upcoming event whose title contains `title`.
    DeleteSchedule { title: String },
    /// Switch the global alarm gate. `None` flips the current value.
    ToggleAlarm { on: Option<bool> },
    /// Free conversation.
    None,
}

/// Action tag of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Add,
    Check,
    Delete,
    Alarm,
    None,
}

impl Command {
    pub fn action(&self) -> CommandAction {
        match self {
            Self::AddSchedule { .. } => CommandAction::Add,
            Self::CheckSchedule { .. } => CommandAction::Check,
            Self::DeleteSchedule { .. } => CommandAction::Delete,
            Self::ToggleAlarm { .. } => CommandAction::Alarm,
            Self::None => CommandAction::None,
        }
    }
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Check => "CHECK",
            Self::Delete => "DELETE",
            Self::Alarm => "ALARM",
            Self::None => "NONE",
        }
    }
}

/// JSON shape requested from the model. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommand {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_date_time: Option<String>,
    #[serde(default)]
    target_date: Option<String>,
    #[serde(default)]
    alarm_on: Option<serde_json::Value>,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a model-supplied timestamp; a bare date becomes 09:00.
pub fn parse_model_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(temporal::DEFAULT_HOUR, 0, 0))
        })
}

/// Parse a model-supplied day; a full timestamp is truncated to its date.
pub fn parse_model_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_model_datetime(raw).map(|dt| dt.date()))
}

/// Slice the first `{ ... }` block out of a reply that may carry fences or prose.
fn json_object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty() && s != "null")
}

fn alarm_flag(value: Option<serde_json::Value>) -> Option<bool> {
    match value? {
        serde_json::Value::Bool(b) => Some(b),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "on" | "켜" | "켜기" => Some(true),
            "false" | "off" | "꺼" | "끄기" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Turn raw model output into a command, repairing dates from the utterance.
///
/// Never fails: unparseable output yields [`Command::None`].
pub fn parse_command(model_output: &str, utterance: &str, now: NaiveDateTime) -> Command {
    let Some(slice) = json_object_slice(model_output) else {
        debug!("command output has no JSON object");
        return Command::None;
    };
    let raw: RawCommand = match serde_json::from_str(slice) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("command JSON rejected: {e}");
            return Command::None;
        }
    };
    let action = raw
        .action
        .as_deref()
        .map(|a| a.trim().to_uppercase())
        .unwrap_or_default();

    match action.as_str() {
        "ADD" => {
            let start = raw
                .start_date_time
                .as_deref()
                .and_then(parse_model_datetime)
                .or_else(|| temporal::resolve_datetime(utterance, now));
            Command::AddSchedule {
                title: non_blank(raw.title),
                start,
            }
        }
        "CHECK" => {
            let date = raw
                .target_date
                .as_deref()
                .and_then(parse_model_date)
                .or_else(|| temporal::resolve_date(utterance, now));
            Command::CheckSchedule { date }
        }
        "DELETE" => Command::DeleteSchedule {
            title: non_blank(raw.title).unwrap_or_default(),
        },
        "ALARM" => Command::ToggleAlarm {
            on: alarm_flag(raw.alarm_on),
        },
        _ => Command::None,
    }
}

/// Render the extraction instructions, substituting `{now}` and `{weekday}`.
pub fn extraction_prompt(template: &str, now: NaiveDateTime) -> String {
    template
        .replace("{now}", &now.format("%Y-%m-%dT%H:%M:%S").to_string())
        .replace("{weekday}", &now.format("%A").to_string())
}

/// Classifies utterances through a language model.
#[derive(Clone)]
pub struct CommandClassifier {
    llm: Arc<dyn LanguageModel>,
    instructions: String,
}

impl std::fmt::Debug for CommandClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClassifier").finish_non_exhaustive()
    }
}

impl CommandClassifier {
    /// `instructions` is the system prompt template (see [`extraction_prompt`]).
    pub fn new(llm: Arc<dyn LanguageModel>, instructions: impl Into<String>) -> Self {
        Self {
            llm,
            instructions: instructions.into(),
        }
    }

    /// Classify one utterance. Inference failures degrade to [`Command::None`].
    pub async fn classify(&self, utterance: &str, now: NaiveDateTime) -> Command {
        if utterance.trim().is_empty() {
            return Command::None;
        }
        let messages = [
            ChatMessage::system(extraction_prompt(&self.instructions, now)),
            ChatMessage::user(utterance),
        ];
        match self.llm.complete(&messages, CompletionMode::CommandJson).await {
            Ok(output) => {
                let command = parse_command(&output, utterance, now);
                debug!(action = command.action().as_str(), "utterance classified");
                command
            }
            Err(e) => {
                warn!("command extraction failed, treating as conversation: {e}");
                Command::None
            }
        }
    }
}
