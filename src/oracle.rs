//! Patch, test and revert one candidate against a private working copy.

use log::{error, trace};

use crate::enumerator::Candidate;
use crate::error::{RecoveryError, Result};
use crate::format::{ArchiveFormat, FormatError};
use crate::hashing::{digest_bytes, HashAlgorithm};
use crate::working_copy::WorkingCopy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
    BadPassword,
}

/// What the oracle compares extracted content against.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub member: &'a str,
    pub hash: &'a str,
    pub algorithm: HashAlgorithm,
    pub password: Option<&'a str>,
}

pub struct Oracle<'a> {
    copy: WorkingCopy,
    format: &'a dyn ArchiveFormat,
    target: Target<'a>,
}

impl<'a> Oracle<'a> {
    pub fn new(copy: WorkingCopy, format: &'a dyn ArchiveFormat, target: Target<'a>) -> Self {
        Self {
            copy,
            format,
            target,
        }
    }

    pub fn working_copy(&self) -> &WorkingCopy {
        &self.copy
    }

    /// Judge `candidate` as the missing tail.
    ///
    /// The working copy is back at its original length when this returns,
    /// whatever the verdict. Unclassified decoder failures and exhausted I/O
    /// retries come back as errors.
    pub fn test(&mut self, candidate: &Candidate) -> Result<Verdict> {
        self.copy.append(candidate.as_bytes())?;
        let verdict = self.judge(candidate);
        self.copy.restore()?;
        verdict
    }

    fn judge(&self, candidate: &Candidate) -> Result<Verdict> {
        let path = self.copy.path();
        let outcome = self.copy.retry().run(path, "read", || {
            match self
                .format
                .read_member(path, self.target.member, self.target.password)
            {
                Err(FormatError::Io(e)) => Err(e),
                other => Ok(other),
            }
        })?;

        match outcome {
            Ok(content) => {
                if digest_bytes(&content, self.target.algorithm) == self.target.hash {
                    Ok(Verdict::Match)
                } else {
                    trace!("{} extracts but the digest differs", candidate);
                    Ok(Verdict::NoMatch)
                }
            }
            Err(FormatError::InvalidContainer(reason)) | Err(FormatError::MemberUnreadable(reason)) => {
                trace!("{} rejected: {}", candidate, reason);
                Ok(Verdict::NoMatch)
            }
            Err(FormatError::WrongPassword) => Ok(Verdict::BadPassword),
            Err(FormatError::Unclassified(message)) => {
                error!(
                    "Unclassified {} decoder failure on candidate {}: {}",
                    self.format.name(),
                    candidate,
                    message
                );
                Err(RecoveryError::UnclassifiedDecoder {
                    candidate: candidate.to_hex(),
                    message,
                })
            }
            Err(FormatError::Io(e)) => Err(RecoveryError::Io(e)),
        }
    }
}
