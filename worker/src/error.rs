use cartcast_core::error::{BusError, ListError, StorageError};
use thiserror::Error;

/// Errors that can occur inside a worker node.
///
/// Peer failures are never fatal: every call site catches them, logs, and
/// moves on. They exist as variants so the log lines and the router's error
/// responses can say what actually happened.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    List(#[from] ListError),

    #[error("list {0} not found")]
    ListNotFound(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("peer {addr} timed out")]
    PeerTimeout { addr: String },

    #[error("peer {addr} unreachable: {source}")]
    PeerUnreachable {
        addr: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http client setup failed: {0}")]
    Client(reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
