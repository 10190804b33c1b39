use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error taxonomy. Session state-machine misuse and storage
/// failures are kept as distinct variants so callers can match on them
/// instead of string-inspecting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tracking is already in progress")]
    AlreadyTracking,

    #[error("a finished tracking session cannot be reused")]
    SessionFinished,

    #[error("session must be stopped before it can be finalized")]
    NotStopped,

    #[error("no position fixes were recorded for this session")]
    NoRouteData,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("position source failure: {0}")]
    PositionSource(String),

    #[error("activity store is not initialized")]
    NotInitialized,

    #[error("could not open activity database: {0}")]
    StorageUnavailable(#[source] rusqlite::Error),

    #[error("activity database operation failed: {0}")]
    Persistence(#[source] rusqlite::Error),

    #[error("malformed activity record: {0}")]
    MalformedRecord(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to set up logging: {0}")]
    Logging(String),
}
