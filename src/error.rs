//! Error types for the hyodo orchestrator.

/// Top-level error type for the companion backend.
///
/// Collaborator failures are normally absorbed by the reply pipeline and
/// replaced with degraded defaults; only [`CompanionError::Unauthorized`]
/// and [`CompanionError::NotFound`] are expected to reach a caller of a
/// conversational turn.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// SQLite storage error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller does not own the requested resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A session, event or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external collaborator (STT, sentiment, search, LLM, TTS) failed.
    #[error("{service} error: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    /// An external collaborator did not answer in time.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Input rejected before reaching storage.
    #[error("validation error: {0}")]
    Validation(String),

    /// A mutex guarding shared state was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// The requested alarm delivery path is disabled for this deployment.
    #[error("alarm delivery path `{0}` is not active")]
    DeliveryPathInactive(&'static str),
}

impl CompanionError {
    /// Shorthand for a collaborator failure.
    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service,
            message: message.into(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CompanionError>;
