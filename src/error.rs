use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Payload is not JSON, or one of its candidate records is not a JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Reading or writing the history file failed. The file keeps its last good contents.
    #[error("persistence error on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("history file {} is corrupt: {source}", path.display())]
    CorruptHistory {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Transport failure on a connection that delivered no bytes.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("history lock poisoned")]
    LockPoisoned,

    #[error("background task failed: {0}")]
    Task(String),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Persistence { path: path.into(), source }
    }

    /// True for the failures that leave the on-disk history untouched
    /// because the store itself could not be read or written.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Persistence { .. } | Error::CorruptHistory { .. })
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
