//! Remote assistant store boundary.
//!
//! Everything the application needs from the hosted assistant service goes
//! through [`AssistantStore`]; the production implementation is
//! [`OpenAiAssistantStore`], tests substitute mocks.

mod openai;

pub use openai::OpenAiAssistantStore;

use crate::conversation::TurnMessage;
use async_trait::async_trait;
use docchat_core::assistant::{AssistantId, AssistantProfile, FileId};
use docchat_core::error::Result;
use serde::{Deserialize, Serialize};

/// Metadata of a file held by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: FileId,
    pub filename: String,
    pub bytes: u64,
    pub created_at: i64,
}

/// The hosted assistant service contract.
///
/// Files uploaded with [`upload_file`](Self::upload_file) become visible in
/// [`list_files`](Self::list_files) eventually, not immediately; callers
/// must poll with a bound.
#[async_trait]
pub trait AssistantStore: Send + Sync {
    /// Creates a remote assistant bound to `profile`.
    async fn create_assistant(&self, profile: &AssistantProfile) -> Result<AssistantId>;

    /// Deletes a remote assistant.
    async fn delete_assistant(&self, id: &AssistantId) -> Result<()>;

    /// Submits file bytes for retrieval use; returns the assigned id.
    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<FileId>;

    /// Lists the ids of all files the store currently knows.
    async fn list_files(&self) -> Result<Vec<FileId>>;

    /// Fetches metadata for one file.
    async fn retrieve_file(&self, id: &FileId) -> Result<FileInfo>;

    /// Deletes a remote file.
    async fn delete_file(&self, id: &FileId) -> Result<()>;

    /// Runs one assistant turn over the transcript so far.
    async fn complete(&self, assistant: &AssistantId, transcript: &[TurnMessage])
    -> Result<String>;
}
