use thiserror::Error;

/// Errors raised by the synchronization core.
///
/// None of these are fatal to a running session: the session logs them and
/// surfaces a notification instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The selected MIDI port or output device is not present
    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),
    /// A MIDI source could not be parsed
    #[error("malformed MIDI source: {0}")]
    MalformedSource(String),
    /// The recording service failed or answered with a non-success status
    #[error("recording service failure: {0}")]
    ServiceFailure(String),
    /// Opening or talking to a MIDI port failed
    #[error("MIDI connection error: {0}")]
    Connection(String),
    /// Settings could not be loaded or saved
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<midir::InitError> for SyncError {
    fn from(e: midir::InitError) -> Self {
        SyncError::Connection(e.to_string())
    }
}

impl From<midir::PortInfoError> for SyncError {
    fn from(e: midir::PortInfoError) -> Self {
        SyncError::Connection(e.to_string())
    }
}

impl From<midir::SendError> for SyncError {
    fn from(e: midir::SendError) -> Self {
        SyncError::Connection(e.to_string())
    }
}

impl<T> From<midir::ConnectError<T>> for SyncError {
    fn from(e: midir::ConnectError<T>) -> Self {
        SyncError::Connection(e.to_string())
    }
}

impl From<midly::Error> for SyncError {
    fn from(e: midly::Error) -> Self {
        SyncError::MalformedSource(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::MalformedSource(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::ServiceFailure(e.to_string())
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(e: config::ConfigError) -> Self {
        SyncError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(e: toml::ser::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}
