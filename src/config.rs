use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enumerator::MAX_CANDIDATE_LENGTH;
use crate::error::{RecoveryError, Result};
use crate::format::ArchiveType;
use crate::hashing::{normalize_hex, HashAlgorithm};
use crate::working_copy::RetryPolicy;

/// Everything the coordinator needs for one recovery run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub archive: PathBuf,
    pub member: String,
    pub target_hash: String,
    pub algorithm: HashAlgorithm,
    pub start_length: usize,
    pub max_length: Option<usize>,
    pub producers: usize,
    pub consumers: usize,
    pub password: Option<String>,
    pub queue_timeout: Duration,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub work_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub archive_type: Option<ArchiveType>,
    pub show_progress: bool,
}

impl SearchConfig {
    pub fn new(archive: impl Into<PathBuf>, member: impl Into<String>, target_hash: &str) -> Self {
        Self {
            archive: archive.into(),
            member: member.into(),
            target_hash: normalize_hex(target_hash),
            algorithm: HashAlgorithm::Md5,
            start_length: 1,
            max_length: None,
            producers: 4,
            consumers: 4,
            password: None,
            queue_timeout: Duration::from_secs(3),
            queue_capacity: 65_536,
            retry: RetryPolicy::default(),
            work_dir: None,
            output: None,
            archive_type: None,
            show_progress: false,
        }
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_start_length(mut self, length: usize) -> Self {
        self.start_length = length;
        self
    }

    pub fn with_max_length(mut self, max_length: Option<usize>) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_workers(mut self, producers: usize, consumers: usize) -> Self {
        self.producers = producers;
        self.consumers = consumers;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_archive_type(mut self, archive_type: Option<ArchiveType>) -> Self {
        self.archive_type = archive_type;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive.as_os_str().is_empty() {
            return Err(RecoveryError::Config("archive path cannot be empty".to_string()));
        }
        if !self.archive.is_file() {
            return Err(RecoveryError::Config(format!(
                "archive '{}' does not exist",
                self.archive.display()
            )));
        }
        if self.member.is_empty() {
            return Err(RecoveryError::Config("member name cannot be empty".to_string()));
        }
        if self.target_hash.len() != self.algorithm.hex_len()
            || !self.target_hash.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(RecoveryError::Config(format!(
                "'{}' is not a {} digest",
                self.target_hash, self.algorithm
            )));
        }
        if self.start_length == 0 || self.start_length > MAX_CANDIDATE_LENGTH {
            return Err(RecoveryError::Config(format!(
                "start length must be between 1 and {}",
                MAX_CANDIDATE_LENGTH
            )));
        }
        if let Some(max) = self.max_length {
            if max < self.start_length {
                return Err(RecoveryError::Config(format!(
                    "max length ({}) cannot be smaller than start length ({})",
                    max, self.start_length
                )));
            }
        }
        if self.producers == 0 || self.consumers == 0 {
            return Err(RecoveryError::Config(
                "producer and consumer counts must be greater than 0".to_string(),
            ));
        }
        if self.queue_timeout.is_zero() || self.queue_capacity == 0 {
            return Err(RecoveryError::Config(
                "queue timeout and capacity must be positive".to_string(),
            ));
        }
        if self.output_path() == self.archive {
            return Err(RecoveryError::Config(
                "output must differ from the corrupted archive".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the repaired archive is written on success.
    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        default_output_path(&self.archive)
    }
}

fn default_output_path(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let name = match archive.extension() {
        Some(ext) => format!("{}.recovered.{}", stem, ext.to_string_lossy()),
        None => format!("{}.recovered", stem),
    };
    archive.with_file_name(name)
}
