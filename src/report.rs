use std::path::PathBuf;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::coordinator::{AttemptSummary, Recovery};
use crate::hashing::HashAlgorithm;

/// Machine-readable summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub archive: PathBuf,
    pub member: String,
    pub algorithm: HashAlgorithm,
    pub target_hash: String,
    pub suffix_hex: String,
    pub suffix_length: usize,
    pub repaired_archive: PathBuf,
    pub member_size: usize,
    pub attempts: Vec<AttemptSummary>,
}

impl RecoveryReport {
    pub fn new(config: &SearchConfig, recovery: &Recovery) -> Self {
        Self {
            archive: config.archive.clone(),
            member: config.member.clone(),
            algorithm: config.algorithm,
            target_hash: config.target_hash.clone(),
            suffix_hex: recovery.suffix.to_hex(),
            suffix_length: recovery.suffix.len(),
            repaired_archive: recovery.output.clone(),
            member_size: recovery.content.len(),
            attempts: recovery.attempts.clone(),
        }
    }
}
