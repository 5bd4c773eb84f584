//! Recover the missing tail of a truncated archive by brute force.
//!
//! Given the corrupted archive, the name of one member and that member's
//! expected digest, candidate suffixes are enumerated shortest first, spread
//! over a pool of producer and consumer threads, and each one is appended to
//! a private working copy until the member extracts with the right digest.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod enumerator;
pub mod error;
pub mod format;
pub mod hashing;
pub mod oracle;
pub mod pool;
pub mod queue;
pub mod report;
pub mod signal;
pub mod working_copy;

// Re-export commonly used types
pub use config::SearchConfig;
pub use coordinator::{
    AttemptOutcome, AttemptSummary, Coordinator, NoPasswordRetry, PasswordSource, Recovery,
};
pub use enumerator::{Candidate, SuffixEnumerator};
pub use error::{RecoveryError, Result};
pub use format::{detect_archive_type, ArchiveFormat, ArchiveType, Compression, FormatError};
pub use hashing::HashAlgorithm;
pub use report::RecoveryReport;
pub use working_copy::RetryPolicy;
