//! Producer and consumer workers for one attempt.

use std::ops::Range;
use std::time::Duration;

use indicatif::ProgressBar;
use log::{debug, info, warn};

use crate::enumerator::{Candidate, SuffixEnumerator};
use crate::error::Result;
use crate::oracle::{Oracle, Verdict};
use crate::queue::{PopError, QueueReader, QueueWriter};
use crate::signal::TerminationSignal;

const PROGRESS_EVERY: u64 = 500;

/// The single report each consumer hands back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerResult {
    MatchFound(Candidate),
    NotFound,
    BadPassword,
}

#[derive(Debug)]
pub struct ConsumerReport {
    pub consumer: usize,
    pub result: Result<ConsumerResult>,
    pub tested: u64,
}

/// Push every candidate of `shard` unless the attempt is stopped first.
/// Returns how many candidates were pushed.
pub fn produce(
    id: usize,
    shard: Range<u64>,
    queue: QueueWriter,
    signal: &TerminationSignal,
    poll: Duration,
) -> u64 {
    debug!("Producer {} starting on [{}, {})", id, shard.start, shard.end);
    let mut pushed = 0;
    for candidate in SuffixEnumerator::new(shard) {
        if signal.is_raised() {
            debug!("Producer {} stopping early, attempt is over", id);
            break;
        }
        if !queue.push(candidate, poll, || signal.is_raised()) {
            break;
        }
        pushed += 1;
    }
    debug!("Producer {} closing after {} candidates", id, pushed);
    pushed
}

pub struct Consumer<'a> {
    id: usize,
    oracle: Oracle<'a>,
    queue: QueueReader,
    signal: &'a TerminationSignal,
    timeout: Duration,
    progress: ProgressBar,
    tested: u64,
}

impl<'a> Consumer<'a> {
    pub fn new(
        id: usize,
        oracle: Oracle<'a>,
        queue: QueueReader,
        signal: &'a TerminationSignal,
        timeout: Duration,
        progress: ProgressBar,
    ) -> Self {
        Self {
            id,
            oracle,
            queue,
            signal,
            timeout,
            progress,
            tested: 0,
        }
    }

    /// Test candidates until the queue closes or the attempt stops.
    pub fn run(mut self) -> ConsumerReport {
        debug!("Consumer {} starting", self.id);
        let result = self.consume();
        debug!(
            "Consumer {} reporting {:?} after {} candidates",
            self.id,
            result.as_ref().ok(),
            self.tested
        );
        ConsumerReport {
            consumer: self.id,
            result,
            tested: self.tested,
        }
    }

    fn consume(&mut self) -> Result<ConsumerResult> {
        loop {
            if self.signal.is_raised() {
                self.discard_rest();
                return Ok(ConsumerResult::NotFound);
            }
            let candidate = match self.queue.pop(self.timeout) {
                Ok(candidate) => candidate,
                Err(PopError::Closed) => return Ok(ConsumerResult::NotFound),
                // Producers are still running; look at the signal again.
                Err(PopError::Empty) => continue,
            };
            if self.signal.is_raised() {
                self.discard_rest();
                return Ok(ConsumerResult::NotFound);
            }

            self.tested += 1;
            self.progress.inc(1);
            if self.tested % PROGRESS_EVERY == 0 {
                debug!(
                    "Consumer {} processed {} candidates, {} queued",
                    self.id,
                    self.tested,
                    self.queue.len()
                );
            }

            match self.oracle.test(&candidate) {
                Ok(Verdict::NoMatch) => {}
                Ok(Verdict::Match) => {
                    if self.signal.try_mark_found() {
                        info!("Consumer {} found the missing bytes: {}", self.id, candidate);
                        self.discard_rest();
                        return Ok(ConsumerResult::MatchFound(candidate));
                    }
                    warn!(
                        "Consumer {} matched {} after the attempt was already stopped",
                        self.id, candidate
                    );
                    self.discard_rest();
                    return Ok(ConsumerResult::NotFound);
                }
                Ok(Verdict::BadPassword) => {
                    self.signal.abort();
                    return Ok(ConsumerResult::BadPassword);
                }
                Err(e) => {
                    self.signal.abort();
                    self.discard_rest();
                    return Err(e);
                }
            }
        }
    }

    fn discard_rest(&self) {
        let dropped = self.queue.drain();
        if dropped > 0 {
            debug!("Consumer {} discarded {} queued candidates", self.id, dropped);
        }
    }
}
