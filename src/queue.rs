//! Shared work queue carrying candidates from producers to consumers.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::enumerator::Candidate;

/// Why a bounded pop came back without a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the timeout; producers may still be running.
    Empty,
    /// Every writer is gone and the queue is drained.
    Closed,
}

/// Producer-side handle. The queue closes once every writer is dropped.
#[derive(Clone)]
pub struct QueueWriter {
    sender: Sender<Candidate>,
}

/// Consumer-side handle.
#[derive(Clone)]
pub struct QueueReader {
    receiver: Receiver<Candidate>,
}

/// Multi-producer/multi-consumer FIFO for one attempt, holding at most
/// `capacity` candidates at a time.
pub fn work_queue(capacity: usize) -> (QueueWriter, QueueReader) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (QueueWriter { sender }, QueueReader { receiver })
}

impl QueueWriter {
    /// Push `candidate`, waiting in `poll` slices while the queue is full.
    ///
    /// Returns `false` without pushing once `give_up` reports true or every
    /// reader is gone.
    pub fn push(&self, candidate: Candidate, poll: Duration, give_up: impl Fn() -> bool) -> bool {
        let mut pending = candidate;
        loop {
            match self.sender.send_timeout(pending, poll) {
                Ok(()) => return true,
                Err(SendTimeoutError::Disconnected(_)) => return false,
                Err(SendTimeoutError::Timeout(back)) => {
                    if give_up() {
                        return false;
                    }
                    pending = back;
                }
            }
        }
    }
}

impl QueueReader {
    pub fn pop(&self, timeout: Duration) -> Result<Candidate, PopError> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Empty,
            RecvTimeoutError::Disconnected => PopError::Closed,
        })
    }

    /// Racy snapshot, only good as a heuristic.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Discard whatever is queued right now without waiting for more.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}
