//! docchat-core - domain types for the document Q&A chat.
//!
//! This crate holds the coordination primitives and data models shared by
//! the interaction and application layers:
//!
//! - `input`: the single-slot human-input bridge ([`input::PendingInputSlot`])
//! - `session`: session phase tracking with an atomic start claim
//! - `assistant`: assistant profile / handle data model
//! - `message`: chat message types and the ordered UI side-channel
//! - `knowledge`: pluggable domain responders
//! - `config`: secrets and runtime tunables
//! - `error`: the shared [`DocchatError`] type

pub mod assistant;
pub mod config;
pub mod error;
pub mod input;
pub mod knowledge;
pub mod message;
pub mod session;

// Re-export common error type
pub use error::{DocchatError, Result};
