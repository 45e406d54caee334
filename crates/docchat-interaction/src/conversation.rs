//! The multi-turn agent conversation protocol.
//!
//! [`ConversationProtocol::initiate`] drives a conversation from an opening
//! human message to the termination marker, alternating assistant turns with
//! human replies awaited through the [`PendingInputSlot`]. Every message from
//! either party is forwarded to the UI in emission order before the protocol
//! proceeds; the forwarding sink is a pure observer and never blocks a turn.

use crate::store::AssistantStore;
use docchat_core::assistant::AssistantId;
use docchat_core::error::Result;
use docchat_core::input::PendingInputSlot;
use docchat_core::message::{Sender, UiSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prompt shown to the human when the protocol awaits their reply.
pub const HUMAN_INPUT_PROMPT: &str =
    "Provide feedback to the assistant (a message containing the termination marker ends the chat)";

/// One transcript entry of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnMessage {
    pub sender: Sender,
    pub content: String,
}

impl TurnMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
        }
    }
}

/// How an initiated conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The termination marker was observed.
    Completed,
    /// The session's cancellation token fired between turns.
    Cancelled,
}

/// Turn-by-turn driver of one conversation against a remote assistant.
pub struct ConversationProtocol {
    store: Arc<dyn AssistantStore>,
    slot: Arc<PendingInputSlot>,
    sink: UiSink,
    termination_marker: String,
    cancel: CancellationToken,
}

impl ConversationProtocol {
    pub fn new(
        store: Arc<dyn AssistantStore>,
        slot: Arc<PendingInputSlot>,
        sink: UiSink,
        termination_marker: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            slot,
            sink,
            termination_marker: termination_marker.into(),
            cancel,
        }
    }

    fn is_termination(&self, content: &str) -> bool {
        content.contains(&self.termination_marker)
    }

    /// Forwards a protocol message to the UI before the protocol proceeds.
    fn forward(&self, message: &TurnMessage) {
        self.sink
            .chat(message.sender.clone(), message.content.clone());
    }

    /// Runs the conversation from `opening` until termination or cancellation.
    ///
    /// # Errors
    ///
    /// A failed remote completion or a broken input slot aborts the
    /// conversation; the caller terminates the session.
    pub async fn initiate(
        &self,
        assistant_id: &AssistantId,
        opening: String,
    ) -> Result<SessionOutcome> {
        let mut transcript: Vec<TurnMessage> = Vec::new();
        let mut human_text = opening;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            let human_turn = TurnMessage::user(human_text.clone());
            self.forward(&human_turn);
            transcript.push(human_turn);
            if self.is_termination(&human_text) {
                return Ok(SessionOutcome::Completed);
            }

            let reply = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(SessionOutcome::Cancelled),
                reply = self.store.complete(assistant_id, &transcript) => reply?,
            };
            let assistant_turn = TurnMessage::assistant(reply.clone());
            self.forward(&assistant_turn);
            transcript.push(assistant_turn);
            if self.is_termination(&reply) {
                return Ok(SessionOutcome::Completed);
            }

            self.sink.chat(Sender::System, HUMAN_INPUT_PROMPT);
            human_text = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(SessionOutcome::Cancelled),
                value = self.slot.request() => value?,
            };
        }
    }
}
