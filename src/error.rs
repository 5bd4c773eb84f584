use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the recovery engine
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("IO on {path} still failing after {attempts} attempts: {source}")]
    TransientIo {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Unclassified decoder failure while testing candidate {candidate}: {message}")]
    UnclassifiedDecoder { candidate: String, message: String },

    #[error("Unsupported archive: {0}")]
    UnsupportedArchive(String),

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHash(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Password rejected and no replacement was supplied")]
    PasswordRejected,

    #[error("No suffix found up to the maximum length of {max} bytes")]
    LengthExhausted { max: usize },

    #[error("Candidate length {0} is too large to enumerate")]
    LengthOverflow(usize),

    #[error("A {0} worker panicked")]
    WorkerPanicked(&'static str),
}

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;
