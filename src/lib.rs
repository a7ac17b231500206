//! Hyodo: conversational companion backend for elderly users and their guardians.
//!
//! The crate turns one utterance (text or voice) into either a calendar
//! action or a dialect- and emotion-aware reply, and delivers calendar
//! reminders exactly once.
//!
//! # Architecture
//!
//! - **Store**: SQLite sessions and an append-only message log
//! - **Command**: classifies an utterance into add/check/delete/alarm/none
//! - **Personality**: data-driven persona, dialect and emotion prompt layers
//! - **Pipeline**: per-turn orchestration with degraded collaborator defaults
//! - **Scheduler**: atomic due-alarm delivery behind a poll or sweep transport
//!
//! External services (language model, speech-to-text, sentiment, speech
//! synthesis, web search) sit behind narrow async traits with HTTP adapters.

pub mod calendar;
pub mod command;
pub mod config;
pub mod emotion;
pub mod error;
pub mod identity;
pub mod llm;
pub mod personality;
pub mod pipeline;
pub mod scheduler;
pub mod search;
pub mod sentiment;
pub mod store;
pub mod stt;
pub mod tts;
pub mod verification;

pub use config::CompanionConfig;
pub use error::{CompanionError, Result};
pub use pipeline::{ReplyPipeline, TurnInput, TurnReply, TurnRequest};
pub use scheduler::{AlarmDispatcher, SweepRunner};
