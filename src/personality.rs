//! Persona tables and prompt assembly.
//!
//! The system prompt for a conversational turn is assembled from layers, in
//! this fixed order:
//!
//! 1. **Persona** — who the companion is (senior mode) or a plain assistant line.
//! 2. **Dialect directive** — selected by the session's region code.
//! 3. **Grounding block** — only when search snippets are present.
//! 4. **Response guidelines** — including length guidance, which differs
//!    between grounded and casual replies.
//! 5. **Emotion directive** — always last, always present.
//!
//! All text lives in [`PersonaTables`], compiled into the binary from
//! `Personality/persona-tables.toml` and replaceable at runtime through
//! `[persona] tables_path`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use hyodo_search::SearchResult;
use serde::Deserialize;

use crate::config::DEFAULT_REGION;
use crate::emotion::Emotion;
use crate::error::{CompanionError, Result};
use crate::llm::ChatMessage;
use crate::store::Message;

/// Built-in tables, compiled from `Personality/persona-tables.toml`.
pub const BUILTIN_TABLES: &str = include_str!("../Personality/persona-tables.toml");

/// Longest title kept after post-processing, in characters.
pub const MAX_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaText {
    pub senior: String,
    pub plain: String,
    pub guidelines: String,
    pub default_dialect: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundingText {
    pub header: String,
    pub footer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LengthGuidance {
    pub grounded: String,
    pub casual: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instructions {
    pub instructions: String,
}

/// Every prompt and reply string the companion uses.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaTables {
    pub persona: PersonaText,
    /// region code → dialect directive.
    pub dialects: BTreeMap<String, String>,
    pub grounding: GroundingText,
    pub length: LengthGuidance,
    /// [`Emotion::key`] → response stance.
    pub emotions: BTreeMap<String, String>,
    pub command: Instructions,
    pub title: Instructions,
    /// region code → phrase key → reply text. `std` is the fallback.
    pub phrases: BTreeMap<String, BTreeMap<String, String>>,
}

/// Dialect-flavoured reply used when a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    AskDatetime,
    AskTitle,
    Added,
    AskDate,
    NothingScheduled,
    ScheduleHeader,
    AskWhich,
    Deleted,
    NotFound,
    AlarmOn,
    AlarmOff,
    Apology,
    ReplyFailed,
}

impl Phrase {
    pub const ALL: [Phrase; 13] = [
        Phrase::AskDatetime,
        Phrase::AskTitle,
        Phrase::Added,
        Phrase::AskDate,
        Phrase::NothingScheduled,
        Phrase::ScheduleHeader,
        Phrase::AskWhich,
        Phrase::Deleted,
        Phrase::NotFound,
        Phrase::AlarmOn,
        Phrase::AlarmOff,
        Phrase::Apology,
        Phrase::ReplyFailed,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::AskDatetime => "ask_datetime",
            Self::AskTitle => "ask_title",
            Self::Added => "added",
            Self::AskDate => "ask_date",
            Self::NothingScheduled => "nothing_scheduled",
            Self::ScheduleHeader => "schedule_header",
            Self::AskWhich => "ask_which",
            Self::Deleted => "deleted",
            Self::NotFound => "not_found",
            Self::AlarmOn => "alarm_on",
            Self::AlarmOff => "alarm_off",
            Self::Apology => "apology",
            Self::ReplyFailed => "reply_failed",
        }
    }
}

impl PersonaTables {
    /// Parse the compiled-in tables.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Config`] if the built-in TOML is invalid.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_TABLES)
    }

    /// Parse and validate tables from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let tables: Self =
            toml::from_str(text).map_err(|e| CompanionError::Config(format!("persona tables: {e}")))?;
        tables.validate()?;
        Ok(tables)
    }

    /// Load from `path` when given, otherwise the built-in tables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_toml(&text)
            }
            None => Self::builtin(),
        }
    }

    /// Every emotion needs a directive and `std` needs every phrase.
    pub fn validate(&self) -> Result<()> {
        if let Some(missing) = Emotion::ALL
            .iter()
            .find(|e| !self.emotions.contains_key(e.key()))
        {
            return Err(CompanionError::Config(format!(
                "persona tables: no directive for emotion `{}`",
                missing.key()
            )));
        }
        let std = self.phrases.get(DEFAULT_REGION).ok_or_else(|| {
            CompanionError::Config("persona tables: missing [phrases.std]".into())
        })?;
        if let Some(missing) = Phrase::ALL.iter().find(|p| !std.contains_key(p.key())) {
            return Err(CompanionError::Config(format!(
                "persona tables: [phrases.std] lacks `{}`",
                missing.key()
            )));
        }
        Ok(())
    }

    /// Dialect directive for `region`, or the standard-register default.
    pub fn dialect(&self, region: &str) -> &str {
        self.dialects
            .get(&region.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.persona.default_dialect)
    }

    pub fn emotion_directive(&self, emotion: Emotion) -> &str {
        self.emotions
            .get(emotion.key())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Reply text for `phrase` in `region`, falling back to `std`.
    pub fn phrase(&self, region: &str, phrase: Phrase) -> &str {
        let key = phrase.key();
        self.phrases
            .get(&region.to_lowercase())
            .and_then(|p| p.get(key))
            .or_else(|| self.phrases.get(DEFAULT_REGION).and_then(|p| p.get(key)))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// [`phrase`](Self::phrase) with `{name}` placeholders substituted.
    pub fn render(&self, region: &str, phrase: Phrase, vars: &[(&str, &str)]) -> String {
        vars.iter()
            .fold(self.phrase(region, phrase).to_owned(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }
}

/// Annotate the current utterance with its detected emotion.
pub fn contextualize(user_text: &str, emotion: Emotion) -> String {
    format!("사용자 (감정: {}): {user_text}", emotion.label())
}

/// Normalise a model-generated title; `None` when nothing usable remains.
pub fn clean_title(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'))
        .collect();
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_owned())
}

/// Builds language-model prompts from the persona tables.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    tables: Arc<PersonaTables>,
}

impl PromptAssembler {
    pub fn new(tables: Arc<PersonaTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &PersonaTables {
        &self.tables
    }

    /// Assemble the layered system prompt.
    pub fn system_prompt(
        &self,
        emotion: Emotion,
        region: &str,
        senior_friendly: bool,
        snippets: &[SearchResult],
    ) -> String {
        let t = &*self.tables;
        let mut prompt = String::new();

        if senior_friendly {
            prompt.push_str(&t.persona.senior);
            prompt.push(' ');
            prompt.push_str(t.dialect(region));
            prompt.push('\n');
        } else {
            prompt.push_str(&t.persona.plain);
            prompt.push('\n');
        }

        if !snippets.is_empty() {
            prompt.push('\n');
            prompt.push_str(t.grounding.header.trim_end());
            prompt.push('\n');
            for s in snippets {
                prompt.push_str(&format!("- {} : {}\n", s.title, s.description));
            }
            prompt.push_str(&t.grounding.footer);
            prompt.push('\n');
        }

        if senior_friendly {
            prompt.push('\n');
            prompt.push_str(t.persona.guidelines.trim_end());
            prompt.push('\n');
            let length = if snippets.is_empty() {
                &t.length.casual
            } else {
                &t.length.grounded
            };
            prompt.push_str(length.trim_end());
            prompt.push('\n');
        }

        prompt.push_str(&format!("\n[User Emotion: {}]", t.emotion_directive(emotion)));
        prompt
    }

    /// `[system, ...history, user]` for a conversational reply.
    ///
    /// History emotion annotations are dropped; `user_text` is the raw
    /// utterance and is contextualised here.
    pub fn build(
        &self,
        history: &[Message],
        user_text: &str,
        emotion: Emotion,
        region: &str,
        senior_friendly: bool,
        snippets: &[SearchResult],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(
            emotion,
            region,
            senior_friendly,
            snippets,
        )));
        messages.extend(
            history
                .iter()
                .map(|m| ChatMessage::new(m.role, m.content.clone())),
        );
        messages.push(ChatMessage::user(contextualize(user_text, emotion)));
        messages
    }

    /// Prompt asking for a short session title from the first exchange.
    pub fn title_prompt(&self, first_user: &str, first_reply: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.tables.title.instructions.clone()),
            ChatMessage::user(format!("User: {first_user}\nAI: {first_reply}")),
        ]
    }
}
