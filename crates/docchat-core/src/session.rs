//! Conversation session phase tracking.
//!
//! A process hosts at most one conversation session. The cell below is the
//! atomic check-and-set the turn router relies on to guarantee that rapid
//! successive UI messages start exactly one session.

use std::sync::Mutex;

/// Lifecycle phase of the single conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session has been started yet.
    NotStarted,
    /// A session was claimed and is in its pre-conversation settle delay.
    Starting,
    /// The conversation protocol is being driven turn by turn.
    Running,
    /// The session ended and remote teardown ran. Terminal.
    Terminated,
}

/// Thread-safe phase cell with forward-only transitions.
pub struct SessionStateCell {
    inner: Mutex<PhaseState>,
}

struct PhaseState {
    phase: SessionPhase,
    failed: bool,
}

impl SessionStateCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PhaseState {
                phase: SessionPhase::NotStarted,
                failed: false,
            }),
        }
    }

    /// Atomically claims the one allowed start: `NotStarted -> Starting`.
    ///
    /// Returns true for exactly one caller per process run; every later or
    /// concurrent caller sees false.
    pub fn try_begin(&self) -> bool {
        let mut state = self.inner.lock().expect("session state poisoned");
        if state.phase == SessionPhase::NotStarted {
            state.phase = SessionPhase::Starting;
            true
        } else {
            false
        }
    }

    /// Marks the session as actively running the conversation protocol.
    pub fn mark_running(&self) {
        let mut state = self.inner.lock().expect("session state poisoned");
        if state.phase == SessionPhase::Starting {
            state.phase = SessionPhase::Running;
        }
    }

    /// Marks the session terminated, optionally flagging it as failed.
    pub fn mark_terminated(&self, failed: bool) {
        let mut state = self.inner.lock().expect("session state poisoned");
        state.phase = SessionPhase::Terminated;
        state.failed = state.failed || failed;
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().expect("session state poisoned").phase
    }

    /// True once a start has been claimed, in any later phase too.
    pub fn is_started(&self) -> bool {
        self.phase() != SessionPhase::NotStarted
    }

    pub fn has_failed(&self) -> bool {
        self.inner.lock().expect("session state poisoned").failed
    }
}

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}
