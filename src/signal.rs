use std::sync::atomic::{AtomicU8, Ordering};

const UNSET: u8 = 0;
const FOUND: u8 = 1;
const ABORTED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Unset,
    Found,
    Aborted,
}

/// Tri-state stop flag shared by every worker of one attempt.
///
/// Transitions only leave `Unset`; the first writer wins.
#[derive(Debug)]
pub struct TerminationSignal {
    state: AtomicU8,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNSET),
        }
    }

    pub fn state(&self) -> SignalState {
        match self.state.load(Ordering::Acquire) {
            UNSET => SignalState::Unset,
            FOUND => SignalState::Found,
            _ => SignalState::Aborted,
        }
    }

    pub fn is_raised(&self) -> bool {
        self.state() != SignalState::Unset
    }

    /// Claim the match. Only one caller per attempt gets `true`.
    pub fn try_mark_found(&self) -> bool {
        self.transition(FOUND)
    }

    /// Stop the attempt without a match. No effect once already raised.
    pub fn abort(&self) -> bool {
        self.transition(ABORTED)
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(UNSET, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for TerminationSignal {
    fn default() -> Self {
        Self::new()
    }
}
