//! Error types for the engine runtime.
//!
//! None of these are fatal: the session logs them and carries on with the
//! next tick, edit or sample.

/// A player call failed or was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayerError {
    #[error("Player unavailable: {0}")]
    Unavailable(String),

    #[error("Player rejected command: {0}")]
    Rejected(String),
}

/// The annotation store could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored annotation is invalid: {0}")]
    Corrupt(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Session is closed")]
    Closed,
}
