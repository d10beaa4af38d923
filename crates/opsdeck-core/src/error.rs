use thiserror::Error;

/// Errors produced by the session core.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("unknown program: {0}")]
    UnknownProgram(String),

    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("input too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("write to session terminal failed: {0}")]
    WriteFailed(String),

    #[error("session already has an active subscriber: {0}")]
    Busy(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type DeckResult<T> = Result<T, DeckError>;
