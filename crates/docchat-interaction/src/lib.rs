//! docchat-interaction - external collaborators of the chat core.
//!
//! Hosts the remote assistant store boundary ([`store::AssistantStore`] and
//! its OpenAI REST implementation), the turn-by-turn conversation protocol,
//! and secret-file loading.

pub mod conversation;
pub mod secret;
pub mod store;

pub use conversation::{ConversationProtocol, SessionOutcome, TurnMessage};
pub use secret::{SecretStorage, SecretStorageError};
pub use store::{AssistantStore, FileInfo, OpenAiAssistantStore};
