use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for LogGuard
#[derive(Debug, Error)]
pub enum LogGuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failure of the identifier generation capability
#[derive(Debug, Error)]
#[error("failed to generate id: {0}")]
pub struct IdGenerationError(pub String);

/// Errors raised while building or decoding a [`LogEvent`](crate::LogEvent)
#[derive(Debug, Error)]
pub enum EventError {
    #[error(transparent)]
    IdGeneration(#[from] IdGenerationError),

    #[error("log event message is empty")]
    EmptyMessage,

    #[error("failed to encode log event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode log event: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors reported by ingestion sources on the shared error channel
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Failed to read from stdin: {0}")]
    StdinRead(#[source] io::Error),

    #[error("Failed to open file {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to seek in file {path:?}: {source}")]
    FileSeek {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read from file {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create file watcher: {0}")]
    WatcherCreate(String),

    #[error("Failed to watch file {path:?}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error("File watch error on {path:?}: {message}")]
    WatcherFault { path: PathBuf, message: String },

    #[error("Failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to listen on {address}: {source}")]
    Listen {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection on {address}: {source}")]
    Accept {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Socket read error on {address}: {source}")]
    SocketRead {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Failed to build log event: {0}")]
    Event(#[from] EventError),
}

/// Errors raised while writing events out
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] EventError),
}

/// Result type alias for LogGuard operations
pub type Result<T> = std::result::Result<T, LogGuardError>;
