//! docchat-application - coordination between the UI surface and the
//! conversation machinery.
//!
//! [`coordinator::ChatCoordinator`] is the single owner of shared mutable
//! state: it routes UI messages, runs the one conversation session of the
//! process, and rebinds the assistant when a document upload completes.

pub mod coordinator;
pub mod upload;

pub use coordinator::ChatCoordinator;
pub use upload::{UploadStatus, UploadedFileRecord, await_file_visible};
