//! Chat message types and the UI side-channel.
//!
//! Every message produced inside the conversation protocol is published to
//! the UI through [`UiSink`] in emission order, tagged with the originating
//! party. The sink is an observer: it never blocks or fails the protocol.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identity of a message's originating party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The human behind the UI (the user proxy side of the protocol).
    User,
    /// The remote assistant.
    Assistant,
    /// System-side notices (prompts, upload status, errors).
    System,
    /// A pluggable domain responder, by name.
    Domain(String),
}

impl Sender {
    pub fn display_name(&self) -> &str {
        match self {
            Sender::User => "user_proxy",
            Sender::Assistant => "assistant",
            Sender::System => "System",
            Sender::Domain(name) => name,
        }
    }

    pub fn avatar(&self) -> &str {
        match self {
            Sender::User => "👨‍💼",
            Sender::Assistant => "🤖",
            Sender::System => "⚙️",
            Sender::Domain(_) => "📖",
        }
    }
}

/// A message as displayed by the chat UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub sender: Sender,
    pub content: String,
    /// Timestamp when the message was forwarded (ISO 8601 format).
    pub timestamp: String,
}

/// Events delivered to the UI over the side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A chat message to render.
    Chat(DisplayMessage),
    /// Upload progress for the document sidebar.
    UploadStatus { label: String, busy: bool },
}

/// Ordered, non-blocking publisher of [`UiEvent`]s.
///
/// Cloneable; all clones feed the same receiver. A closed receiver (UI gone)
/// is logged and otherwise ignored so protocol progress is never coupled to
/// UI liveness.
#[derive(Clone)]
pub struct UiSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiSink {
    /// Creates a sink together with the receiver the UI drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publishes a chat message from `sender`.
    pub fn chat(&self, sender: Sender, content: impl Into<String>) {
        self.publish(UiEvent::Chat(DisplayMessage {
            sender,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }));
    }

    /// Publishes an upload status update.
    pub fn upload_status(&self, label: impl Into<String>, busy: bool) {
        self.publish(UiEvent::UploadStatus {
            label: label.into(),
            busy,
        });
    }

    fn publish(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("UI receiver closed; dropping event");
        }
    }
}
