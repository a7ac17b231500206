//! Conversational reply pipeline.

pub mod coordinator;
pub mod messages;

pub use coordinator::ReplyPipeline;
pub use messages::{TurnInput, TurnReply, TurnRequest, TurnStage};
