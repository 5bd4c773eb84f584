//! Length-escalation loop that runs one producer/consumer pool per
//! candidate length.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;
use tempfile::TempDir;

use crate::config::SearchConfig;
use crate::enumerator::{attempt_candidate_count, attempt_shards, Candidate};
use crate::error::{RecoveryError, Result};
use crate::format::{detect_archive_type, format_for, ArchiveFormat, FormatError};
use crate::hashing::digest_bytes;
use crate::oracle::{Oracle, Target};
use crate::pool::{produce, Consumer, ConsumerReport, ConsumerResult};
use crate::queue::work_queue;
use crate::signal::TerminationSignal;
use crate::working_copy::{append_bytes, WorkingCopy};

/// Supplies a new password after the current one was rejected.
pub trait PasswordSource {
    /// `None` gives up on the run.
    fn replacement(&mut self, rejected: Option<&str>) -> Option<String>;
}

impl<F> PasswordSource for F
where
    F: FnMut(Option<&str>) -> Option<String>,
{
    fn replacement(&mut self, rejected: Option<&str>) -> Option<String> {
        self(rejected)
    }
}

/// Password source for non-interactive runs.
pub struct NoPasswordRetry;

impl PasswordSource for NoPasswordRetry {
    fn replacement(&mut self, _rejected: Option<&str>) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found,
    Exhausted,
    BadPassword,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub length: usize,
    pub candidates_tested: u64,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
struct AttemptResult {
    summary: AttemptSummary,
    found: Option<Candidate>,
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct Recovery {
    pub suffix: Candidate,
    pub output: PathBuf,
    pub content: Vec<u8>,
    pub password: Option<String>,
    pub attempts: Vec<AttemptSummary>,
}

enum Phase {
    Attempting(usize),
    Retry(usize),
    RetryPassword(usize),
    Success(Candidate),
}

pub struct Coordinator {
    config: SearchConfig,
    format: Box<dyn ArchiveFormat>,
}

impl Coordinator {
    /// Pick the archive format from the config override or the file itself.
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let archive_type = match config.archive_type {
            Some(archive_type) => archive_type,
            None => detect_archive_type(&config.archive)?,
        };
        info!("Detected archive type: {}", archive_type);
        let format = format_for(archive_type)?;
        Self::with_format(config, format)
    }

    pub fn with_format(config: SearchConfig, format: Box<dyn ArchiveFormat>) -> Result<Self> {
        config.validate()?;
        if config.password.is_some() && !format.supports_passwords() {
            return Err(RecoveryError::Config(format!(
                "{} archives cannot be password protected",
                format.name()
            )));
        }
        Ok(Self { config, format })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search lengths upward from the configured start until a suffix
    /// matches, the maximum length is passed, or the password source gives up.
    pub fn run(&self, passwords: &mut dyn PasswordSource) -> Result<Recovery> {
        let scratch = self.scratch_dir()?;
        let mut password = self.config.password.clone();
        let mut attempts = Vec::new();
        let mut phase = Phase::Attempting(self.config.start_length);

        loop {
            phase = match phase {
                Phase::Attempting(length) => {
                    let result = self.attempt(length, password.as_deref(), scratch.path())?;
                    let outcome = result.summary.outcome;
                    attempts.push(result.summary);
                    match (outcome, result.found) {
                        (AttemptOutcome::Found, Some(candidate)) => Phase::Success(candidate),
                        (AttemptOutcome::BadPassword, _) => Phase::RetryPassword(length),
                        _ => Phase::Retry(length + 1),
                    }
                }
                Phase::Retry(length) => {
                    if let Some(max) = self.config.max_length {
                        if length > max {
                            return Err(RecoveryError::LengthExhausted { max });
                        }
                    }
                    info!("No suffix of length {} matched, trying {}", length - 1, length);
                    Phase::Attempting(length)
                }
                Phase::RetryPassword(length) => {
                    warn!("The password provided is incorrect");
                    password = Some(
                        passwords
                            .replacement(password.as_deref())
                            .ok_or(RecoveryError::PasswordRejected)?,
                    );
                    info!("Retrying length {} with a new password", length);
                    Phase::Attempting(length)
                }
                Phase::Success(candidate) => return self.finish(candidate, password, attempts),
            };
        }
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("recover-truncated-");
        Ok(match &self.config.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        })
    }

    fn attempt(&self, length: usize, password: Option<&str>, scratch: &Path) -> Result<AttemptResult> {
        let started = Instant::now();
        let shards = attempt_shards(length, self.config.producers)?;
        let total = attempt_candidate_count(&shards);
        info!(
            "Attempt at length {}: {} candidates, {} producers, {} consumers",
            length,
            total,
            shards.len(),
            self.config.consumers
        );

        let progress = self.progress_bar(total, length);
        let signal = TerminationSignal::new();
        let (writer, reader) = work_queue(self.config.queue_capacity);
        let target = Target {
            member: &self.config.member,
            hash: &self.config.target_hash,
            algorithm: self.config.algorithm,
            password,
        };
        let extension = self
            .config
            .archive
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut consumers = Vec::with_capacity(self.config.consumers);
        for id in 0..self.config.consumers {
            let copy = WorkingCopy::create(
                &self.config.archive,
                scratch,
                &format!("tr_{}{}", id, extension),
                self.config.retry,
            )?;
            consumers.push(Consumer::new(
                id,
                Oracle::new(copy, self.format.as_ref(), target),
                reader.clone(),
                &signal,
                self.config.queue_timeout,
                progress.clone(),
            ));
        }
        drop(reader);

        let poll = self.config.queue_timeout;
        let reports = thread::scope(|scope| -> Result<Vec<ConsumerReport>> {
            let mut consumer_threads = Vec::with_capacity(consumers.len());
            for consumer in consumers {
                let (tx, rx) = crossbeam_channel::bounded(1);
                let handle = scope.spawn(move || {
                    let _ = tx.send(consumer.run());
                });
                consumer_threads.push((rx, handle));
            }

            let producers: Vec<_> = shards
                .into_iter()
                .enumerate()
                .map(|(id, shard)| {
                    let writer = writer.clone();
                    let signal = &signal;
                    scope.spawn(move || produce(id, shard, writer, signal, poll))
                })
                .collect();
            drop(writer);

            let mut producer_panicked = false;
            for handle in producers {
                producer_panicked |= handle.join().is_err();
            }
            if producer_panicked {
                signal.abort();
            }

            let mut reports = Vec::with_capacity(consumer_threads.len());
            let mut consumer_panicked = false;
            for (rx, handle) in consumer_threads {
                match rx.recv() {
                    Ok(report) => reports.push(report),
                    Err(_) => consumer_panicked = true,
                }
                consumer_panicked |= handle.join().is_err();
            }
            if producer_panicked {
                return Err(RecoveryError::WorkerPanicked("producer"));
            }
            if consumer_panicked {
                return Err(RecoveryError::WorkerPanicked("consumer"));
            }
            Ok(reports)
        })?;
        progress.finish_and_clear();

        let (found, summary) = aggregate(length, reports, started)?;
        info!(
            "Attempt at length {} finished: {:?} after {} candidates in {} ms",
            length, summary.outcome, summary.candidates_tested, summary.elapsed_ms
        );
        Ok(AttemptResult { summary, found })
    }

    /// Write the repaired archive and read the member back out of it.
    fn finish(
        &self,
        suffix: Candidate,
        password: Option<String>,
        attempts: Vec<AttemptSummary>,
    ) -> Result<Recovery> {
        let output = self.config.output_path();
        fs::copy(&self.config.archive, &output)?;
        append_bytes(&output, suffix.as_bytes())?;

        let content = self
            .format
            .read_member(&output, &self.config.member, password.as_deref())
            .map_err(|e| match e {
                FormatError::Io(e) => RecoveryError::Io(e),
                other => RecoveryError::UnclassifiedDecoder {
                    candidate: suffix.to_hex(),
                    message: format!("repaired archive does not open: {}", other),
                },
            })?;
        if digest_bytes(&content, self.config.algorithm) != self.config.target_hash {
            return Err(RecoveryError::UnclassifiedDecoder {
                candidate: suffix.to_hex(),
                message: "repaired archive no longer matches the target hash".to_string(),
            });
        }

        info!(
            "Recovered {} missing bytes ({}), repaired archive at {}",
            suffix.len(),
            suffix,
            output.display()
        );
        Ok(Recovery {
            suffix,
            output,
            content,
            password,
            attempts,
        })
    }

    fn progress_bar(&self, total: u64, length: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, {eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(format!("length {}", length));
        bar
    }
}

/// Fold the per-consumer reports into one attempt outcome.
///
/// A verified match wins over everything; otherwise the first fatal error is
/// returned, then a rejected password, then exhaustion.
fn aggregate(
    length: usize,
    reports: Vec<ConsumerReport>,
    started: Instant,
) -> Result<(Option<Candidate>, AttemptSummary)> {
    let mut found: Option<Candidate> = None;
    let mut failure = None;
    let mut bad_password = false;
    let mut tested = 0;

    for report in reports {
        tested += report.tested;
        match report.result {
            Ok(ConsumerResult::MatchFound(candidate)) => {
                if found.is_none() {
                    found = Some(candidate);
                } else {
                    warn!("Consumer {} also reported {}, ignoring it", report.consumer, candidate);
                }
            }
            Ok(ConsumerResult::BadPassword) => bad_password = true,
            Ok(ConsumerResult::NotFound) => {}
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    let outcome = if found.is_some() {
        AttemptOutcome::Found
    } else if let Some(e) = failure {
        return Err(e);
    } else if bad_password {
        AttemptOutcome::BadPassword
    } else {
        AttemptOutcome::Exhausted
    };

    Ok((
        found,
        AttemptSummary {
            length,
            candidates_tested: tested,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
        },
    ))
}
