//! Single-slot bridge between the UI event context and the conversation loop.
//!
//! The conversation loop calls [`PendingInputSlot::request`] when it needs a
//! human reply and suspends until the UI supplies one. The UI event handler
//! calls [`PendingInputSlot::supply`] with whatever the human typed; if
//! nothing is awaited the value is dropped and the caller reports it.

use crate::error::{DocchatError, Result};
use tokio::sync::{Mutex, oneshot};

/// Outcome of supplying a value to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyOutcome {
    /// The value was handed to the one outstanding requester.
    Delivered,
    /// No request was outstanding; the value was dropped.
    NoneAwaiting,
}

/// A single-value synchronization point for "human text awaited".
///
/// At most one unresolved request exists at a time. A second concurrent
/// [`request`](Self::request) is rejected with
/// [`DocchatError::InputAlreadyPending`] rather than queued; each resolution
/// wakes exactly one requester and clears the slot for reuse.
#[derive(Default)]
pub struct PendingInputSlot {
    waiting: Mutex<Option<oneshot::Sender<String>>>,
}

impl PendingInputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends until the UI supplies a value.
    ///
    /// # Errors
    ///
    /// Returns `InputAlreadyPending` if another request is still outstanding,
    /// or `Internal` if the slot is dropped while awaiting.
    pub async fn request(&self) -> Result<String> {
        let receiver = {
            let mut waiting = self.waiting.lock().await;
            // A sender whose requester has gone away is stale and may be replaced.
            if waiting.as_ref().is_some_and(|tx| !tx.is_closed()) {
                return Err(DocchatError::InputAlreadyPending);
            }
            let (tx, rx) = oneshot::channel();
            *waiting = Some(tx);
            rx
        };

        receiver
            .await
            .map_err(|_| DocchatError::internal("input slot closed while awaiting"))
    }

    /// Resolves the outstanding request, if any, with `value`.
    ///
    /// The slot is cleared before the value is handed over, so a new request
    /// may be issued as soon as the current one resolves. With no request
    /// outstanding the value is dropped and `NoneAwaiting` is returned.
    pub async fn supply(&self, value: String) -> SupplyOutcome {
        let sender = self.waiting.lock().await.take();
        match sender {
            Some(tx) => match tx.send(value) {
                Ok(()) => SupplyOutcome::Delivered,
                // Requester gave up before the value arrived.
                Err(_) => SupplyOutcome::NoneAwaiting,
            },
            None => SupplyOutcome::NoneAwaiting,
        }
    }

    /// Returns true if a request is currently awaiting a value.
    pub async fn is_awaiting(&self) -> bool {
        self.waiting
            .lock()
            .await
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}
