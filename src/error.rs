use std::path::PathBuf;
use thiserror::Error;

/// Result type for file operations
pub type FileOpResult<T> = Result<T, FileOpError>;

/// Error types for file operations
#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("Copy failed from {src:?} to {dest:?}: {source}")]
    CopyFailed {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Copy of {dest:?} is incomplete: expected {expected} bytes, found {actual}")]
    VerifyFailed {
        dest: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("Remove failed for {path:?}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the state snapshot store
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state snapshot {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("State snapshot {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Write(#[from] FileOpError),
}

/// Fatal errors that halt a balancing run.
///
/// Anything recoverable is reported through `BalanceWarning` instead.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Cannot create folder {path:?}: {source}")]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot read input folder {path:?}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot read output folder {path:?}: {source}")]
    ReadOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot reset folder {path:?}: {source}")]
    ResetFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    State(#[from] StateError),
}
