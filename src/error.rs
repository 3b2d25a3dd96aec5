use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorStatusError {
    #[error("failed to retrieve mirrorstatus data: {0}")]
    Retrieve(String),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings file: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("attempted to sort mirrors by unrecognized criterion: \"{0}\"")]
    UnknownSortField(String),

    #[error("no mirrors detected in mirror status output")]
    NoMirrors,

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("rating aborted: deadline exceeded")]
    DeadlineExceeded,

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, MirrorStatusError>;

/// Failure of a single rate probe. These never abort a rating pass; the probe
/// is recorded with a zero rate instead.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("download timed out")]
    Timeout,

    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("rsync exited with {0}")]
    Rsync(std::process::ExitStatus),

    #[error("{0}")]
    Other(String),
}

impl From<crate::deadline::Expired> for ProbeError {
    fn from(_: crate::deadline::Expired) -> Self {
        ProbeError::Timeout
    }
}
