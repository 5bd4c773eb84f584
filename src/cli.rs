use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::config::SearchConfig;
use crate::enumerator::MAX_CANDIDATE_LENGTH;
use crate::error::Result;
use crate::format::ArchiveType;
use crate::hashing::{digest_file, HashAlgorithm};

/// Recover the missing trailing bytes of a truncated archive
#[derive(Parser, Debug)]
#[command(name = "recover-truncated")]
#[command(about = "Brute-force the missing tail of a truncated archive", long_about = None)]
#[command(author, version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for the bytes cut off the end of an archive
    Recover(RecoverArgs),

    /// Cut bytes off the end of a copy of an archive
    Truncate(TruncateArgs),

    /// Print the digest of a file
    Hash(HashArgs),
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("target").required(true).args(["hash", "original"])))]
pub struct RecoverArgs {
    /// Truncated archive
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Member whose content is known
    #[arg(short, long)]
    pub member: String,

    /// Expected digest of the member, in hex
    #[arg(long)]
    pub hash: Option<String>,

    /// Intact copy of the member to take the digest from
    #[arg(long, value_name = "FILE")]
    pub original: Option<PathBuf>,

    /// Digest algorithm (md5, sha1, sha224, sha256, sha384, sha512, crc32)
    #[arg(short, long, default_value = "md5")]
    pub algorithm: HashAlgorithm,

    /// First suffix length to try
    #[arg(long = "start-length", default_value = "1")]
    pub start_length: usize,

    /// Give up after this suffix length
    #[arg(long = "max-length")]
    pub max_length: Option<usize>,

    /// Number of producer threads
    #[arg(long, default_value = "4")]
    pub producers: usize,

    /// Number of consumer threads
    #[arg(long, default_value = "4")]
    pub consumers: usize,

    /// Archive password
    #[arg(short, long, conflicts_with = "ask_password")]
    pub password: Option<String>,

    /// Prompt for the archive password before searching
    #[arg(long = "ask-password")]
    pub ask_password: bool,

    /// How long an idle consumer waits on the queue, in milliseconds
    #[arg(long = "timeout-ms", default_value = "3000")]
    pub timeout_ms: u64,

    /// Bound on queued candidates
    #[arg(long = "queue-capacity", default_value = "65536")]
    pub queue_capacity: usize,

    /// Archive type instead of detecting it (zip, rar, tar, tgz, tar.bz2, ...)
    #[arg(long = "type", value_name = "TYPE")]
    pub archive_type: Option<ArchiveType>,

    /// Directory for the per-consumer working copies
    #[arg(long = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// Where to write the repaired archive
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write the recovered member to this file
    #[arg(long = "extract-to")]
    pub extract_to: Option<PathBuf>,

    /// Print a JSON report instead of text
    #[arg(long)]
    pub json: bool,

    /// Disable the progress bar
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

impl RecoverArgs {
    /// Validate the arguments
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.archive.as_os_str().is_empty() {
            return Err("Archive path cannot be empty".to_string());
        }

        if self.start_length == 0 || self.start_length > MAX_CANDIDATE_LENGTH {
            return Err(format!(
                "start-length must be between 1 and {}",
                MAX_CANDIDATE_LENGTH
            ));
        }

        if let Some(max) = self.max_length {
            if max < self.start_length {
                return Err(format!(
                    "max-length ({}) cannot be smaller than start-length ({})",
                    max, self.start_length
                ));
            }
        }

        if self.producers == 0 || self.consumers == 0 {
            return Err("producers and consumers must be greater than 0".to_string());
        }

        if self.timeout_ms == 0 {
            return Err("timeout-ms must be greater than 0".to_string());
        }

        if let Some(extract_to) = &self.extract_to {
            if extract_to == &self.archive {
                return Err("extract-to would overwrite the archive".to_string());
            }
        }

        Ok(())
    }

    /// Expected digest, from `--hash` or computed from `--original`.
    pub fn target_hash(&self) -> Result<String> {
        match (&self.hash, &self.original) {
            (Some(hash), _) => Ok(hash.clone()),
            (None, Some(original)) => Ok(digest_file(original, self.algorithm)?),
            (None, None) => Err(crate::error::RecoveryError::Config(
                "either --hash or --original is required".to_string(),
            )),
        }
    }

    pub fn to_config(&self, password: Option<String>) -> Result<SearchConfig> {
        let config = SearchConfig::new(&self.archive, self.member.clone(), &self.target_hash()?)
            .with_algorithm(self.algorithm)
            .with_start_length(self.start_length)
            .with_max_length(self.max_length)
            .with_workers(self.producers, self.consumers)
            .with_password(password)
            .with_queue_timeout(Duration::from_millis(self.timeout_ms))
            .with_queue_capacity(self.queue_capacity)
            .with_work_dir(self.work_dir.clone())
            .with_output(self.output.clone())
            .with_archive_type(self.archive_type)
            .with_progress(!self.no_progress && !self.json);
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct TruncateArgs {
    /// Intact archive
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Number of bytes to cut off the end
    #[arg(short = 'n', long)]
    pub bytes: u64,

    /// Where to write the truncated copy
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also print the digest of this member of the intact archive
    #[arg(short, long)]
    pub member: Option<String>,

    /// Digest algorithm for --member
    #[arg(short, long, default_value = "md5")]
    pub algorithm: HashAlgorithm,

    /// Password for reading --member
    #[arg(short, long)]
    pub password: Option<String>,
}

impl TruncateArgs {
    /// `--output`, or `<stem>.truncated.<ext>` next to the archive.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(output) => output.clone(),
            None => sibling_with_tag(&self.archive, "truncated"),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct HashArgs {
    /// File to digest
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Digest algorithm
    #[arg(short, long, default_value = "md5")]
    pub algorithm: HashAlgorithm,
}

fn sibling_with_tag(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, tag, ext.to_string_lossy()),
        None => format!("{}.{}", stem, tag),
    };
    path.with_file_name(name)
}
