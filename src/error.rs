use thiserror::Error;

/// Everything the engine can fail with.
///
/// The first group is caller input that was rejected before any query ran;
/// the rest are internal failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown scope '{0}' (expected one of: character, base, storage, frigate, corvette, ship, vehicles)")]
    InvalidScope(String),

    #[error("malformed save root label '{0}'")]
    InvalidRoot(String),

    #[error("unknown save root '{0}'")]
    UnknownRoot(String),

    #[error("invalid payload {path}: {reason}")]
    InvalidPayload { path: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("ingest worker for root '{0}' panicked")]
    WorkerPanicked(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True for errors caused by the request itself rather than the system.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidScope(_)
                | Error::InvalidRoot(_)
                | Error::UnknownRoot(_)
                | Error::InvalidPayload { .. }
                | Error::InvalidArgument(_)
        )
    }
}
