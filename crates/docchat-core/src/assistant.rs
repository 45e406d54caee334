//! Assistant configuration data model.
//!
//! The profile is what a session start reads and what a completed upload
//! rewrites. Concurrency protection lives at the application layer, which
//! guards the runtime record with a `tokio::sync::RwLock`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a file held by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a remotely created assistant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssistantId(pub String);

impl AssistantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssistantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tools the assistant is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    /// Document retrieval over the attached files.
    Retrieval,
}

/// The mutable assistant configuration read at session-start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantProfile {
    pub model: String,
    pub instructions: String,
    pub tools: Vec<ToolKind>,
    /// Files the assistant may retrieve from. Holds at most one entry:
    /// each completed upload replaces the whole list.
    pub file_ids: Vec<FileId>,
}

impl AssistantProfile {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            tools: vec![ToolKind::Retrieval],
            file_ids: Vec::new(),
        }
    }

    /// Replaces the attached-file list with exactly `file_id`.
    ///
    /// Returns the previously attached file, if any.
    pub fn replace_file(&mut self, file_id: FileId) -> Option<FileId> {
        let previous = self.file_ids.drain(..).next();
        self.file_ids.push(file_id);
        previous
    }

    /// The currently attached file, if one is registered.
    pub fn attached_file(&self) -> Option<&FileId> {
        self.file_ids.first()
    }
}

/// The live assistant record: profile plus the remote handle bound to it.
///
/// `assistant_id` is `None` until a session start or a completed upload
/// creates the remote assistant.
#[derive(Debug, Clone)]
pub struct AssistantRuntime {
    pub profile: AssistantProfile,
    pub assistant_id: Option<AssistantId>,
}

impl AssistantRuntime {
    pub fn new(profile: AssistantProfile) -> Self {
        Self {
            profile,
            assistant_id: None,
        }
    }
}
