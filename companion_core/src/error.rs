//! Error taxonomy for the conversation engine.

use thiserror::Error;

/// Failures reported by a generation backend.
///
/// Any of these mid-stream is handled like a cancellation: the pending turn is rolled back.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("model failed to load: {0}")]
    ModelLoadFailure(String),

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Errors surfaced by session operations. All of them leave the session usable.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no persona loaded")]
    ConfigMissing,

    #[error("last turn is not an assistant turn; nothing to regenerate")]
    NoAssistantTurnToRegenerate,

    #[error("last turn is not an assistant turn; nothing to continue")]
    NoAssistantTurnToContinue,

    #[error("invalid edit index {index} (history has {len} turns)")]
    InvalidEditIndex { index: usize, len: usize },

    #[error("malformed lore update: {0}")]
    MalformedLoreUpdate(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("session document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SessionError {
    fn from(err: toml::ser::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
