//! Turn orchestrator that wires all collaborators together.
//!
//! One turn walks `received → transcribed? → scored → classified →
//! {executing command | generating reply} → titled? → logged →
//! synthesized? → responded`. The user turn is written to the message log
//! before classification, so a failure later in the turn loses only the
//! reply. Collaborator failures never abort a turn; they are replaced by a
//! neutral emotion, [`Command::None`], or a dialect apology. Only identity,
//! ownership and storage errors reach the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use hyodo_search::SearchResult;
use tracing::{debug, info, warn};

use crate::calendar::{CalendarService, DEFAULT_ALARM_MINUTES, NewEvent};
use crate::command::{Command, CommandClassifier};
use crate::config::ChatConfig;
use crate::emotion::{self, Emotion, EmotionSummary};
use crate::error::{CompanionError, Result};
use crate::identity::IdentityStore;
use crate::llm::{CompletionMode, LanguageModel};
use crate::personality::{PersonaTables, Phrase, PromptAssembler, clean_title};
use crate::pipeline::messages::{TurnInput, TurnReply, TurnRequest, TurnStage};
use crate::search::{SearchProvider, needs_search};
use crate::sentiment::SentimentAnalyzer;
use crate::store::{Database, Message, MessageLog, Role, Session, SessionStore};
use crate::stt::{self, AudioClip, Transcriber};
use crate::tts::{self, SpeechSynthesizer};

type SessionLock = Arc<tokio::sync::Mutex<()>>;

/// Exclusive use of one session for the duration of a turn.
///
/// On drop the map entry is removed unless another turn is waiting on it.
struct SessionTurn<'a> {
    locks: &'a Mutex<HashMap<i64, SessionLock>>,
    session_id: i64,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SessionTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

/// Coordinates one conversational turn at a time per session.
pub struct ReplyPipeline {
    sessions: SessionStore,
    log: MessageLog,
    identity: Arc<dyn IdentityStore>,
    calendar: CalendarService,
    llm: Arc<dyn LanguageModel>,
    classifier: CommandClassifier,
    prompts: PromptAssembler,
    sentiment: Arc<dyn SentimentAnalyzer>,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    search: Option<Arc<dyn SearchProvider>>,
    chat: ChatConfig,
    /// Turns within one session are serialized through these.
    session_locks: Mutex<HashMap<i64, SessionLock>>,
}

impl std::fmt::Debug for ReplyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyPipeline")
            .field("chat", &self.chat)
            .field("speech_in", &self.transcriber.is_some())
            .field("speech_out", &self.synthesizer.is_some())
            .field("search", &self.search.is_some())
            .finish_non_exhaustive()
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn enter(stage: TurnStage, session_id: i64) {
    match stage {
        TurnStage::Classified(action) => {
            debug!(session_id, stage = stage.as_str(), action = action.as_str(), "turn stage");
        }
        _ => debug!(session_id, stage = stage.as_str(), "turn stage"),
    }
}

fn format_when(at: NaiveDateTime) -> String {
    at.format("%-m월 %-d일 %H:%M").to_string()
}

fn format_day(date: NaiveDate) -> String {
    date.format("%-m월 %-d일").to_string()
}

impl ReplyPipeline {
    /// Create a pipeline. Speech and search collaborators are optional and
    /// attached with the `with_*` methods.
    pub fn new(
        db: Database,
        identity: Arc<dyn IdentityStore>,
        calendar: CalendarService,
        llm: Arc<dyn LanguageModel>,
        sentiment: Arc<dyn SentimentAnalyzer>,
        tables: Arc<PersonaTables>,
        chat: ChatConfig,
    ) -> Self {
        let classifier =
            CommandClassifier::new(Arc::clone(&llm), tables.command.instructions.clone());
        Self {
            sessions: SessionStore::new(db.clone()),
            log: MessageLog::new(db),
            identity,
            calendar,
            llm,
            classifier,
            prompts: PromptAssembler::new(tables),
            sentiment,
            transcriber: None,
            synthesizer: None,
            search: None,
            chat,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn calendar(&self) -> &CalendarService {
        &self.calendar
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    /// Process a turn at the current local time.
    pub async fn handle(&self, request: TurnRequest) -> Result<TurnReply> {
        self.handle_at(request, local_now()).await
    }

    /// Process a turn as of `now`.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Unauthorized` for unknown users or foreign sessions, and
    /// storage failures. Collaborator failures are absorbed.
    pub async fn handle_at(&self, request: TurnRequest, now: NaiveDateTime) -> Result<TurnReply> {
        let TurnRequest {
            user_id,
            session_id,
            region,
            input,
        } = request;

        let owner_id = self.identity.effective_owner(user_id)?;

        let _turn = match session_id {
            Some(id) => {
                self.sessions.get_owned(user_id, id)?;
                Some(self.lock_session(id).await?)
            }
            None => None,
        };

        let session = self.sessions.resolve(
            user_id,
            session_id,
            region.as_deref(),
            &self.chat.default_region,
            now,
        )?;
        enter(TurnStage::Received, session.id);
        let region = session.region_code.clone();

        let utterance = match input {
            TurnInput::Text(text) => text,
            TurnInput::Voice(clip) => {
                let text = self.transcribe(&region, &clip).await;
                enter(TurnStage::Transcribed, session.id);
                text
            }
        };

        let emotion = self.score(&utterance).await;
        enter(TurnStage::Scored, session.id);

        let user_turn =
            self.log
                .append(session.id, Role::User, &utterance, Some(emotion.label()), now)?;

        let command = self.classify(&utterance, now).await;
        let action = command.action();
        enter(TurnStage::Classified(action), session.id);

        let reply = match command {
            Command::None => {
                enter(TurnStage::GeneratingReply, session.id);
                self.generate_reply(&session, &user_turn, emotion).await?
            }
            command => {
                enter(TurnStage::ExecutingCommand, session.id);
                self.execute_command(user_id, owner_id, command, &region, now)
            }
        };

        let title = match session.title.clone() {
            Some(title) => Some(title),
            None => self.generate_title(session.id, &utterance, &reply, now).await,
        };

        self.log.append(session.id, Role::Assistant, &reply, None, now)?;
        self.sessions.touch(session.id, now)?;
        enter(TurnStage::Logged, session.id);

        let audio = self.synthesize(&reply, &region).await;
        if audio.is_some() {
            enter(TurnStage::Synthesized, session.id);
        }

        let history = self.log.recent(session.id, self.chat.history_limit)?;
        enter(TurnStage::Responded, session.id);
        info!(session_id = session.id, action = action.as_str(), "turn completed");

        Ok(TurnReply {
            session_id: session.id,
            title,
            region,
            utterance,
            emotion,
            action: action.as_str(),
            reply,
            history,
            audio,
        })
    }

    /// Sessions of `user_id`, newest first.
    pub fn sessions(&self, user_id: i64) -> Result<Vec<Session>> {
        self.sessions.list_for_user(user_id)
    }

    /// Recent turns of an owned session, oldest first.
    ///
    /// Without a limit the larger of `history_limit` and `history_window` applies.
    pub fn history(&self, user_id: i64, session_id: i64, limit: Option<usize>) -> Result<Vec<Message>> {
        self.sessions.get_owned(user_id, session_id)?;
        let limit =
            limit.unwrap_or_else(|| self.chat.history_limit.max(self.chat.history_window));
        self.log.recent(session_id, limit)
    }

    /// Delete an owned session and its messages.
    pub async fn delete_session(&self, user_id: i64, session_id: i64) -> Result<()> {
        self.sessions.get_owned(user_id, session_id)?;
        let _turn = self.lock_session(session_id).await?;
        self.sessions.delete_owned(user_id, session_id)
    }

    /// Emotion distribution of last week.
    pub fn weekly_emotions(&self, user_id: i64, today: NaiveDate) -> Result<EmotionSummary> {
        emotion::weekly_summary(&self.log, user_id, today)
    }

    /// Emotion distribution of last month.
    pub fn monthly_emotions(&self, user_id: i64, today: NaiveDate) -> Result<EmotionSummary> {
        emotion::monthly_summary(&self.log, user_id, today)
    }

    pub fn dominant_emotion_today(&self, user_id: i64, now: NaiveDateTime) -> Result<Option<String>> {
        emotion::dominant_emotion_today(&self.log, user_id, now)
    }

    fn session_lock(&self, session_id: i64) -> Result<SessionLock> {
        let mut locks = self
            .session_locks
            .lock()
            .map_err(|e| CompanionError::Lock(e.to_string()))?;
        Ok(Arc::clone(locks.entry(session_id).or_default()))
    }

    /// Wait for exclusive use of a session. Callers check ownership first so
    /// unknown ids never get an entry.
    async fn lock_session(&self, session_id: i64) -> Result<SessionTurn<'_>> {
        let guard = self.session_lock(session_id)?.lock_owned().await;
        Ok(SessionTurn {
            locks: &self.session_locks,
            session_id,
            guard: Some(guard),
        })
    }

    fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.collaborator_timeout_secs.max(1))
    }

    /// Run a collaborator call under the configured timeout.
    async fn bounded<T>(
        &self,
        service: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.collaborator_timeout(), call)
            .await
            .unwrap_or_else(|_| Err(CompanionError::Timeout(service)))
    }

    fn phrase(&self, region: &str, phrase: Phrase) -> String {
        self.prompts.tables().phrase(region, phrase).to_owned()
    }

    async fn transcribe(&self, region: &str, clip: &AudioClip) -> String {
        let result = match &self.transcriber {
            Some(transcriber) => self.bounded("stt", transcriber.transcribe(region, clip)).await,
            None => Err(CompanionError::Config("no transcriber configured".into())),
        };
        match result {
            Ok(text) => text,
            Err(e) => {
                warn!(region, "transcription failed: {e}");
                stt::failure_text(&e)
            }
        }
    }

    async fn score(&self, text: &str) -> Emotion {
        if text.trim().is_empty() {
            return Emotion::Neutral;
        }
        match self.bounded("sentiment", self.sentiment.analyze(text)).await {
            Ok(emotion) => emotion,
            Err(e) => {
                warn!("sentiment unavailable, assuming neutral: {e}");
                Emotion::Neutral
            }
        }
    }

    async fn classify(&self, utterance: &str, now: NaiveDateTime) -> Command {
        match tokio::time::timeout(
            self.collaborator_timeout(),
            self.classifier.classify(utterance, now),
        )
        .await
        {
            Ok(command) => command,
            Err(_) => {
                warn!("command classification timed out");
                Command::None
            }
        }
    }

    async fn lookup(&self, utterance: &str) -> Vec<SearchResult> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        if !needs_search(utterance, &self.chat.search_keywords) {
            return Vec::new();
        }
        match tokio::time::timeout(self.collaborator_timeout(), search.search(utterance)).await {
            Ok(results) => {
                debug!(count = results.len(), "grounding snippets fetched");
                results
            }
            Err(_) => {
                warn!("web search timed out");
                Vec::new()
            }
        }
    }

    async fn generate_reply(
        &self,
        session: &Session,
        user_turn: &Message,
        emotion: Emotion,
    ) -> Result<String> {
        let limit = self.chat.history_limit;
        let mut history = self.log.recent(session.id, limit + 1)?;
        history.retain(|m| m.id != user_turn.id);
        if history.len() > limit {
            history.drain(..history.len() - limit);
        }

        let snippets = self.lookup(&user_turn.content).await;
        let messages = self.prompts.build(
            &history,
            &user_turn.content,
            emotion,
            &session.region_code,
            self.chat.senior_friendly,
            &snippets,
        );

        match self
            .bounded("llm", self.llm.complete(&messages, CompletionMode::Conversation))
            .await
        {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(session_id = session.id, "reply generation failed: {e}");
                Ok(self.phrase(&session.region_code, Phrase::ReplyFailed))
            }
        }
    }

    /// Execute a classified command. Failures become a dialect apology.
    fn execute_command(
        &self,
        user_id: i64,
        owner_id: i64,
        command: Command,
        region: &str,
        now: NaiveDateTime,
    ) -> String {
        let action = command.action();
        match self.run_command(user_id, owner_id, command, region, now) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(owner_id, action = action.as_str(), "command failed: {e}");
                self.phrase(region, Phrase::Apology)
            }
        }
    }

    fn run_command(
        &self,
        user_id: i64,
        owner_id: i64,
        command: Command,
        region: &str,
        now: NaiveDateTime,
    ) -> Result<String> {
        let tables = self.prompts.tables();
        let reply = match command {
            Command::AddSchedule { title, start } => {
                let Some(title) = title.filter(|t| !t.trim().is_empty()) else {
                    return Ok(self.phrase(region, Phrase::AskTitle));
                };
                let Some(start) = start else {
                    return Ok(self.phrase(region, Phrase::AskDatetime));
                };
                let event = NewEvent::new(owner_id, title, start)
                    .with_alarm_minutes(Some(DEFAULT_ALARM_MINUTES));
                let event = self.calendar.add(event, now)?;
                tables.render(
                    region,
                    Phrase::Added,
                    &[
                        ("title", event.title.as_str()),
                        ("when", format_when(event.start_at).as_str()),
                    ],
                )
            }
            Command::CheckSchedule { date } => {
                let Some(date) = date else {
                    return Ok(self.phrase(region, Phrase::AskDate));
                };
                let events = self.calendar.events_on(owner_id, date)?;
                if events.is_empty() {
                    return Ok(self.phrase(region, Phrase::NothingScheduled));
                }
                let mut text =
                    tables.render(region, Phrase::ScheduleHeader, &[("date", format_day(date).as_str())]);
                for event in &events {
                    text.push_str(&format!("\n- {} {}", event.start_at.format("%H:%M"), event.title));
                }
                text
            }
            Command::DeleteSchedule { title } => {
                if title.trim().is_empty() {
                    return Ok(self.phrase(region, Phrase::AskWhich));
                }
                match self
                    .calendar
                    .delete_nearest_future_by_title(owner_id, &title, now)?
                {
                    Some(event) => tables.render(region, Phrase::Deleted, &[("title", event.title.as_str())]),
                    None => tables.render(region, Phrase::NotFound, &[("title", title.trim())]),
                }
            }
            Command::ToggleAlarm { on } => {
                let enabled = match on {
                    Some(on) => on,
                    None => !self.identity.alarm_enabled(user_id)?,
                };
                self.identity.set_alarm_enabled(user_id, enabled)?;
                self.phrase(region, if enabled { Phrase::AlarmOn } else { Phrase::AlarmOff })
            }
            Command::None => self.phrase(region, Phrase::Apology),
        };
        info!(owner_id, "command executed");
        Ok(reply)
    }

    /// Ask the model for a session title and store it if none is set yet.
    async fn generate_title(
        &self,
        session_id: i64,
        utterance: &str,
        reply: &str,
        now: NaiveDateTime,
    ) -> Option<String> {
        let messages = self.prompts.title_prompt(utterance, reply);
        let raw = match self
            .bounded("llm", self.llm.complete(&messages, CompletionMode::Title))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(session_id, "title generation failed: {e}");
                return None;
            }
        };
        let title = clean_title(&raw)?;
        match self.sessions.set_title_once(session_id, &title, now) {
            Ok(true) => {
                enter(TurnStage::Titled, session_id);
                Some(title)
            }
            Ok(false) => self.sessions.get(session_id).ok().flatten().and_then(|s| s.title),
            Err(e) => {
                warn!(session_id, "storing title failed: {e}");
                None
            }
        }
    }

    async fn synthesize(&self, reply: &str, region: &str) -> Option<String> {
        let synthesizer = self.synthesizer.as_ref()?;
        Some(
            match self.bounded("tts", synthesizer.synthesize(reply, region)).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(region, "speech synthesis failed: {e}");
                    tts::failure_text(&e)
                }
            },
        )
    }
}
