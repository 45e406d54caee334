//! Upload bookkeeping and bounded visibility polling.
//!
//! The remote store lists an uploaded file only after its own ingestion
//! finishes. [`await_file_visible`] polls the listing with geometric backoff
//! and a hard deadline instead of waiting forever.

use docchat_core::assistant::FileId;
use docchat_core::config::PollPolicy;
use docchat_core::error::{DocchatError, Result};
use docchat_interaction::AssistantStore;
use std::path::PathBuf;
use tokio::time::Instant;

/// Progress of one uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Submitted; not yet observed in the remote listing.
    Pending,
    /// Observed in the remote listing; considered final.
    Listed,
    /// Gave up (remote error or visibility timeout).
    Failed,
}

/// One document's journey from UI file-input event to remote visibility.
#[derive(Debug, Clone)]
pub struct UploadedFileRecord {
    /// Scratch copy of the uploaded bytes, when one was written.
    pub local_path: Option<PathBuf>,
    pub file_id: FileId,
    pub status: UploadStatus,
}

/// Polls the store's file listing until `file_id` appears.
///
/// Transient listing errors count as not-yet-visible and are retried until
/// the deadline.
///
/// # Errors
///
/// Returns [`DocchatError::UploadTimeout`] if the file is not listed within
/// `policy.max_wait()`.
pub async fn await_file_visible(
    store: &dyn AssistantStore,
    file_id: &FileId,
    policy: &PollPolicy,
) -> Result<()> {
    let started = Instant::now();
    let deadline = started + policy.max_wait();
    let mut interval = policy.initial_interval();

    loop {
        match store.list_files().await {
            Ok(files) if files.contains(file_id) => {
                tracing::info!(file = %file_id, "uploaded file is visible");
                return Ok(());
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(file = %file_id, error = %err, "file listing failed; will retry");
            }
        }

        if Instant::now() + interval >= deadline {
            return Err(DocchatError::UploadTimeout {
                file_id: file_id.to_string(),
                waited_secs: started.elapsed().as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
        interval = policy.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_core::assistant::{AssistantId, AssistantProfile};
    use docchat_interaction::{FileInfo, TurnMessage};
    use std::sync::Mutex;

    /// Store whose listing becomes populated after a set number of polls.
    struct EventuallyListedStore {
        file: FileId,
        visible_after: usize,
        calls: Mutex<usize>,
        fail_first: bool,
    }

    #[async_trait]
    impl AssistantStore for EventuallyListedStore {
        async fn create_assistant(&self, _profile: &AssistantProfile) -> Result<AssistantId> {
            Ok(AssistantId::new("asst"))
        }

        async fn delete_assistant(&self, _id: &AssistantId) -> Result<()> {
            Ok(())
        }

        async fn upload_file(&self, _filename: &str, _bytes: Vec<u8>) -> Result<FileId> {
            Ok(self.file.clone())
        }

        async fn list_files(&self) -> Result<Vec<FileId>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_first && *calls == 1 {
                return Err(DocchatError::remote_api("list_files", "502: flaky"));
            }
            if *calls > self.visible_after {
                Ok(vec![self.file.clone()])
            } else {
                Ok(Vec::new())
            }
        }

        async fn retrieve_file(&self, id: &FileId) -> Result<FileInfo> {
            Ok(FileInfo {
                id: id.clone(),
                filename: String::new(),
                bytes: 0,
                created_at: 0,
            })
        }

        async fn delete_file(&self, _id: &FileId) -> Result<()> {
            Ok(())
        }

        async fn complete(
            &self,
            _assistant: &AssistantId,
            _transcript: &[TurnMessage],
        ) -> Result<String> {
            Ok(String::new())
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy {
            initial_interval_ms: 100,
            backoff_factor: 2.0,
            max_interval_ms: 1_000,
            max_wait_ms: 10_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_file_is_listed() {
        let store = EventuallyListedStore {
            file: FileId::new("file-1"),
            visible_after: 3,
            calls: Mutex::new(0),
            fail_first: false,
        };

        await_file_visible(&store, &FileId::new("file-1"), &policy())
            .await
            .unwrap();
        assert_eq!(*store.calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_listing_error_is_retried() {
        let store = EventuallyListedStore {
            file: FileId::new("file-1"),
            visible_after: 1,
            calls: Mutex::new(0),
            fail_first: true,
        };

        await_file_visible(&store, &FileId::new("file-1"), &policy())
            .await
            .unwrap();
        assert!(*store.calls.lock().unwrap() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_never_listed() {
        let store = EventuallyListedStore {
            file: FileId::new("file-other"),
            visible_after: usize::MAX,
            calls: Mutex::new(0),
            fail_first: false,
        };

        let err = await_file_visible(&store, &FileId::new("file-1"), &policy())
            .await
            .unwrap_err();
        assert!(err.is_upload_timeout());
    }
}
