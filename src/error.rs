use std::path::PathBuf;
use std::time::Duration;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Errors that can occur while checking for or applying an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    /// The update server answered with something other than 200.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("invalid update server URL: {0}")]
    InvalidUrl(String),
    /// The `last-build` body was not a decimal integer.
    #[error("invalid build number {0:?}")]
    InvalidBuildNumber(String),
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to walk staging directory: {0}")]
    Walk(#[from] walkdir::Error),
    /// The application archive could not be opened or lacks a manifest.
    #[error("application archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("invalid version manifest: {0}")]
    InvalidManifest(String),
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
    /// Settings that parse but cannot be used together.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
    /// The background download did not finish within the allotted time.
    #[error("download did not finish within {0:?}")]
    DownloadTimeout(Duration),
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for UpdaterError {
    fn from(err: tokio::task::JoinError) -> Self {
        UpdaterError::TaskJoin(err.to_string())
    }
}
