//! JSON-lines host for the companion backend.
//!
//! Reads one request object per line from stdin and writes one response
//! object per line to stdout. Alarm notices from the sweep runner are
//! written to stdout as event lines. All tracing output goes to stderr so
//! stdout stays a clean protocol channel.
//!
//! Example request:
//!
//! ```json
//! {"request_id":"1","op":"turn","user_id":1,"text":"내일 2시에 병원 예약 잡아줘"}
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hyodo::calendar::{CalendarService, ScheduleEvent, SqliteCalendarStore};
use hyodo::identity::{IdentityStore, SqliteIdentityStore};
use hyodo::llm::OpenAiChatModel;
use hyodo::personality::PersonaTables;
use hyodo::scheduler::{AlarmDispatcher, SweepRunner};
use hyodo::search::NaverSearch;
use hyodo::sentiment::HttpSentimentAnalyzer;
use hyodo::store::Database;
use hyodo::stt::{AudioClip, HttpTranscriber};
use hyodo::tts::OpenAiSpeech;
use hyodo::verification::{DEFAULT_CODE_TTL_MINUTES, VerificationLedger};
use hyodo::{CompanionConfig, CompanionError, ReplyPipeline, TurnRequest};

type Stdout = Arc<Mutex<tokio::io::Stdout>>;

/// One inbound line.
#[derive(Debug, Deserialize)]
struct HostRequest {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(flatten)]
    op: HostOp,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum HostOp {
    RegisterMember {
        user_id: i64,
        display_name: String,
    },
    RegisterGuardian {
        user_id: i64,
        display_name: String,
        elder_id: i64,
    },
    Turn {
        user_id: i64,
        #[serde(default)]
        session_id: Option<i64>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        text: Option<String>,
        /// Base64 WAV audio; used when `text` is absent.
        #[serde(default)]
        audio: Option<String>,
    },
    Sessions {
        user_id: i64,
    },
    History {
        user_id: i64,
        session_id: i64,
        #[serde(default)]
        limit: Option<usize>,
    },
    DeleteSession {
        user_id: i64,
        session_id: i64,
    },
    PollAlarms {
        user_id: i64,
    },
    SetAlarm {
        user_id: i64,
        enabled: bool,
    },
    Emotions {
        user_id: i64,
    },
    IssueCode {
        key: String,
        code: String,
    },
    VerifyCode {
        key: String,
        code: String,
    },
}

/// One outbound response line.
#[derive(Debug, Serialize)]
struct HostResponse {
    request_id: Option<String>,
    ok: bool,
    payload: Value,
    error: Option<String>,
}

/// One outbound event line.
#[derive(Debug, Serialize)]
struct HostEvent<'a> {
    event_id: String,
    event: &'a str,
    payload: Value,
}

struct Host {
    pipeline: ReplyPipeline,
    identity: Arc<SqliteIdentityStore>,
    dispatcher: Arc<AlarmDispatcher>,
    ledger: VerificationLedger,
}

impl Host {
    async fn dispatch(&self, op: HostOp) -> hyodo::Result<Value> {
        let now = Local::now().naive_local();
        match op {
            HostOp::RegisterMember {
                user_id,
                display_name,
            } => {
                self.identity.register_member(user_id, &display_name, now)?;
                Ok(json!({ "user_id": user_id }))
            }
            HostOp::RegisterGuardian {
                user_id,
                display_name,
                elder_id,
            } => {
                self.identity
                    .register_guardian(user_id, &display_name, elder_id, now)?;
                Ok(json!({ "user_id": user_id, "elder_id": elder_id }))
            }
            HostOp::Turn {
                user_id,
                session_id,
                region,
                text,
                audio,
            } => {
                let mut request = match (text, audio) {
                    (Some(text), _) => TurnRequest::text(user_id, text),
                    (None, Some(audio)) => {
                        let bytes = base64::engine::general_purpose::STANDARD
                            .decode(audio.trim())
                            .map_err(|e| CompanionError::Validation(format!("audio: {e}")))?;
                        TurnRequest::voice(user_id, AudioClip::wav(bytes))
                    }
                    (None, None) => {
                        return Err(CompanionError::Validation(
                            "turn needs `text` or `audio`".into(),
                        ));
                    }
                };
                request.session_id = session_id;
                request.region = region;
                let reply = self.pipeline.handle_at(request, now).await?;
                to_value(&reply)
            }
            HostOp::Sessions { user_id } => to_value(&self.pipeline.sessions(user_id)?),
            HostOp::History {
                user_id,
                session_id,
                limit,
            } => to_value(&self.pipeline.history(user_id, session_id, limit)?),
            HostOp::DeleteSession {
                user_id,
                session_id,
            } => {
                self.pipeline.delete_session(user_id, session_id).await?;
                Ok(json!({ "deleted": session_id }))
            }
            HostOp::PollAlarms { user_id } => {
                to_value(&self.dispatcher.poll_for_user(user_id, now)?)
            }
            HostOp::SetAlarm { user_id, enabled } => {
                self.identity.set_alarm_enabled(user_id, enabled)?;
                Ok(json!({ "alarm_enabled": enabled }))
            }
            HostOp::Emotions { user_id } => {
                let today = now.date();
                Ok(json!({
                    "weekly": self.pipeline.weekly_emotions(user_id, today)?,
                    "monthly": self.pipeline.monthly_emotions(user_id, today)?,
                    "today": self.pipeline.dominant_emotion_today(user_id, now)?,
                }))
            }
            HostOp::IssueCode { key, code } => {
                let ttl = chrono::Duration::minutes(DEFAULT_CODE_TTL_MINUTES);
                let expires_at = self.ledger.issue(&key, &code, now, ttl)?;
                Ok(json!({ "expires_at": expires_at }))
            }
            HostOp::VerifyCode { key, code } => {
                let verified = self.ledger.verify(&key, &code, now)?;
                Ok(json!({ "verified": verified }))
            }
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> hyodo::Result<Value> {
    serde_json::to_value(value).map_err(|e| CompanionError::Validation(e.to_string()))
}

async fn write_line<T: Serialize>(out: &Stdout, value: &T) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut out = out.lock().await;
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

fn load_config() -> anyhow::Result<CompanionConfig> {
    let path = std::env::var_os("HYODO_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(CompanionConfig::default_config_path);
    if path.exists() {
        tracing::info!(path = %path.display(), "loading config");
        CompanionConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        Ok(CompanionConfig::default())
    }
}

fn open_database(path: &Path) -> anyhow::Result<Database> {
    Database::open(path).with_context(|| format!("failed to open {}", path.display()))
}

async fn forward_alarms(mut notices: mpsc::UnboundedReceiver<ScheduleEvent>, out: Stdout) {
    while let Some(event) = notices.recv().await {
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize alarm notice; skipping");
                continue;
            }
        };
        let line = HostEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            event: "alarm.due",
            payload,
        };
        if let Err(e) = write_line(&out, &line).await {
            tracing::warn!(error = %e, "failed to write alarm notice; stopping forwarder");
            break;
        }
    }
}

async fn serve(host: Host, out: Stdout) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<HostRequest>(line) {
            Ok(request) => match host.dispatch(request.op).await {
                Ok(payload) => HostResponse {
                    request_id: request.request_id,
                    ok: true,
                    payload,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "request failed");
                    HostResponse {
                        request_id: request.request_id,
                        ok: false,
                        payload: Value::Null,
                        error: Some(e.to_string()),
                    }
                }
            },
            Err(e) => HostResponse {
                request_id: None,
                ok: false,
                payload: Value::Null,
                error: Some(format!("malformed request: {e}")),
            },
        };
        write_line(&out, &response).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("hyodo-host starting");

    let config = load_config()?;
    let db = open_database(&config.storage.database_path)?;

    let tables = PersonaTables::load(config.persona.tables_path.as_deref())
        .map_err(|e| anyhow::anyhow!("persona tables: {e}"))?;
    let identity = Arc::new(SqliteIdentityStore::new(db.clone()));
    let calendar_store = Arc::new(SqliteCalendarStore::new(db.clone()));
    let llm = Arc::new(OpenAiChatModel::new(config.llm.clone())?);
    let sentiment = Arc::new(HttpSentimentAnalyzer::new(&config.sentiment)?);

    let mut pipeline = ReplyPipeline::new(
        db.clone(),
        identity.clone(),
        CalendarService::new(calendar_store.clone()),
        llm,
        sentiment,
        Arc::new(tables),
        config.chat.clone(),
    )
    .with_transcriber(Arc::new(HttpTranscriber::new(config.stt.clone())?));
    if config.tts.enabled {
        match OpenAiSpeech::new(config.tts.clone()) {
            Ok(speech) => pipeline = pipeline.with_synthesizer(Arc::new(speech)),
            Err(e) => tracing::warn!(error = %e, "speech synthesis disabled"),
        }
    }
    if config.search.validate().is_ok() {
        pipeline = pipeline.with_search(Arc::new(NaverSearch::new(config.search.clone())));
    } else {
        tracing::info!("search credentials missing; replies are not grounded");
    }

    let dispatcher = Arc::new(AlarmDispatcher::new(
        calendar_store,
        identity.clone() as Arc<dyn IdentityStore>,
        config.scheduler.delivery,
    ));
    let ledger = VerificationLedger::new(db);

    let cancel = CancellationToken::new();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let runner = SweepRunner::new(dispatcher.clone(), notice_tx, &config.scheduler)
        .with_verification(ledger.clone())
        .with_cancellation(cancel.clone())
        .run();

    let out: Stdout = Arc::new(Mutex::new(tokio::io::stdout()));
    let forwarder = tokio::spawn(forward_alarms(notice_rx, out.clone()));

    let host = Host {
        pipeline,
        identity,
        dispatcher,
        ledger,
    };

    tracing::info!(
        delivery = config.scheduler.delivery.as_str(),
        "hyodo-host ready"
    );

    let served = tokio::select! {
        result = serve(host, out) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };

    cancel.cancel();
    if let Err(e) = runner.await {
        tracing::warn!(error = %e, "sweep runner task failed");
    }
    // The runner owned the only notice sender, so the forwarder drains and exits.
    let _ = forwarder.await;

    tracing::info!("hyodo-host stopped");
    served
}
