//! The chat coordinator: turn routing, session lifecycle, and
//! upload-triggered reconfiguration.
//!
//! One coordinator owns all shared mutable state of the process (the
//! pending-input slot, the session phase cell, and the assistant runtime
//! record), so nothing here relies on ambient globals or on a particular
//! scheduler for mutual exclusion.

use crate::upload::{self, UploadStatus, UploadedFileRecord};
use docchat_core::assistant::{AssistantProfile, AssistantRuntime};
use docchat_core::config::AssistantSettings;
use docchat_core::error::Result;
use docchat_core::input::{PendingInputSlot, SupplyOutcome};
use docchat_core::knowledge::DomainResponder;
use docchat_core::message::{Sender, UiSink};
use docchat_core::session::{SessionPhase, SessionStateCell};
use docchat_interaction::{AssistantStore, ConversationProtocol, SessionOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Glue between the UI event surface and the conversation machinery.
///
/// UI callbacks call [`handle_user_message`](Self::handle_user_message) and
/// [`handle_upload`](Self::handle_upload); everything else happens in tasks
/// spawned by the coordinator.
pub struct ChatCoordinator {
    store: Arc<dyn AssistantStore>,
    slot: Arc<PendingInputSlot>,
    state: SessionStateCell,
    runtime: Arc<RwLock<AssistantRuntime>>,
    sink: UiSink,
    settings: AssistantSettings,
    responder: Option<Arc<dyn DomainResponder>>,
    cancel: CancellationToken,
}

impl ChatCoordinator {
    pub fn new(store: Arc<dyn AssistantStore>, settings: AssistantSettings, sink: UiSink) -> Self {
        let profile = AssistantProfile::new(settings.model.clone(), settings.instructions.clone());
        Self {
            store,
            slot: Arc::new(PendingInputSlot::new()),
            state: SessionStateCell::new(),
            runtime: Arc::new(RwLock::new(AssistantRuntime::new(profile))),
            sink,
            settings,
            responder: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Installs a domain responder consulted before any session routing.
    pub fn with_responder(mut self, responder: Arc<dyn DomainResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn session_failed(&self) -> bool {
        self.state.has_failed()
    }

    /// True while the conversation loop is waiting on a human reply.
    pub async fn awaiting_input(&self) -> bool {
        self.slot.is_awaiting().await
    }

    /// Snapshot of the current assistant profile.
    pub async fn current_profile(&self) -> AssistantProfile {
        self.runtime.read().await.profile.clone()
    }

    /// Requests cancellation of the session, effective between turns.
    pub fn cancel_session(&self) {
        tracing::info!("session cancellation requested");
        self.cancel.cancel();
    }

    /// Routes one incoming UI message.
    ///
    /// Decision order: a matching domain responder answers directly; else
    /// the first message ever claims the one session start; else the message
    /// resolves the outstanding input request, or is dropped with a
    /// diagnostic when none is outstanding.
    pub async fn handle_user_message(self: &Arc<Self>, text: String) {
        if let Some(responder) = &self.responder {
            if responder.matches(&text) {
                self.sink.chat(Sender::User, text.clone());
                match responder.respond(&text).await {
                    Ok(reply) => self
                        .sink
                        .chat(Sender::Domain(responder.name().to_string()), reply),
                    Err(err) => {
                        tracing::warn!(error = %err, "domain responder failed");
                        self.sink
                            .chat(Sender::System, format!("Domain lookup failed: {err}"));
                    }
                }
                return;
            }
        }

        if self.state.try_begin() {
            // The router must not block the UI event context while the
            // session runs to completion.
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_session(text).await;
            });
        } else {
            match self.slot.supply(text).await {
                SupplyOutcome::Delivered => {}
                SupplyOutcome::NoneAwaiting => {
                    tracing::warn!("there is currently no input being awaited; dropping message");
                }
            }
        }
    }

    /// Runs the one session of this process: settle delay, conversation to
    /// termination, remote teardown.
    async fn run_session(self: Arc<Self>, opening: String) {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::info!("session cancelled during settle delay");
                // An earlier upload may already hold remote resources.
                self.teardown().await;
                self.state.mark_terminated(false);
                return;
            }
            _ = tokio::time::sleep(self.settings.start_delay()) => {}
        }

        let failed = match self.drive_conversation(opening).await {
            Ok(SessionOutcome::Completed) => {
                tracing::info!("conversation reached its termination marker");
                false
            }
            Ok(SessionOutcome::Cancelled) => {
                tracing::info!("conversation cancelled");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "session failed");
                self.sink
                    .chat(Sender::System, format!("Session failed: {err}"));
                true
            }
        };

        self.teardown().await;
        self.state.mark_terminated(failed);
    }

    async fn drive_conversation(&self, opening: String) -> Result<SessionOutcome> {
        // The read guard is held for the whole run so an upload cannot swap
        // the configuration out from under the running conversation.
        let runtime = {
            let mut runtime = self.runtime.write().await;
            if runtime.assistant_id.is_none() {
                runtime.assistant_id = Some(self.store.create_assistant(&runtime.profile).await?);
            }
            runtime.downgrade()
        };
        let assistant_id = runtime
            .assistant_id
            .clone()
            .ok_or_else(|| docchat_core::DocchatError::internal("assistant handle vanished"))?;

        self.state.mark_running();
        let protocol = ConversationProtocol::new(
            Arc::clone(&self.store),
            Arc::clone(&self.slot),
            self.sink.clone(),
            self.settings.termination_marker.clone(),
            self.cancel.child_token(),
        );
        protocol.initiate(&assistant_id, opening).await
    }

    /// Releases remote resources. Failures are logged, never propagated:
    /// the session is over either way.
    async fn teardown(&self) {
        let mut runtime = self.runtime.write().await;
        if let Some(assistant_id) = runtime.assistant_id.take() {
            if let Err(err) = self.store.delete_assistant(&assistant_id).await {
                tracing::warn!(assistant = %assistant_id, error = %err, "assistant teardown failed");
            }
        }
        if let Some(file_id) = runtime.profile.file_ids.drain(..).next() {
            match self.store.delete_file(&file_id).await {
                Ok(()) => tracing::info!(file = %file_id, "deleted registered file"),
                Err(err) => {
                    tracing::warn!(file = %file_id, error = %err, "file teardown failed");
                }
            }
        }
    }

    /// Handles a completed UI file-input event: upload, await visibility,
    /// then atomically rebind the assistant to the new document.
    ///
    /// Blocks while a session holds the configuration, so a running
    /// conversation never observes a half-replaced profile.
    pub async fn handle_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFileRecord> {
        self.sink.upload_status("Uploading", true);
        let result = self.reconfigure_with_upload(filename, bytes).await;
        match &result {
            Ok(record) => {
                self.sink
                    .upload_status(format!("Document uploaded - {filename}"), false);
                self.sink.chat(
                    Sender::System,
                    format!("Document '{filename}' is ready ({})", record.file_id),
                );
            }
            Err(err) => {
                // Surfaced to the chat, not just the diagnostic stream.
                self.sink.upload_status("Upload failed", false);
                self.sink
                    .chat(Sender::System, format!("Upload of '{filename}' failed: {err}"));
            }
        }
        result
    }

    async fn reconfigure_with_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFileRecord> {
        let local_path = self.write_scratch_copy(filename, &bytes).await;

        let file_id = self.store.upload_file(filename, bytes).await?;
        let mut record = UploadedFileRecord {
            local_path,
            file_id: file_id.clone(),
            status: UploadStatus::Pending,
        };

        if let Err(err) =
            upload::await_file_visible(self.store.as_ref(), &file_id, &self.settings.poll).await
        {
            record.status = UploadStatus::Failed;
            return Err(err);
        }
        record.status = UploadStatus::Listed;

        let mut runtime = self.runtime.write().await;
        if let Some(old_assistant) = runtime.assistant_id.take() {
            if let Err(err) = self.store.delete_assistant(&old_assistant).await {
                tracing::warn!(assistant = %old_assistant, error = %err,
                    "stale assistant could not be deleted");
            }
        }
        if let Some(previous_file) = runtime.profile.replace_file(file_id.clone()) {
            if let Err(err) = self.store.delete_file(&previous_file).await {
                tracing::warn!(file = %previous_file, error = %err,
                    "stale file could not be deleted");
            }
        }
        runtime.assistant_id = Some(self.store.create_assistant(&runtime.profile).await?);
        drop(runtime);

        tracing::info!(file = %file_id, filename, "assistant rebound to uploaded document");
        Ok(record)
    }

    async fn write_scratch_copy(&self, filename: &str, bytes: &[u8]) -> Option<PathBuf> {
        let path = std::env::temp_dir().join(format!("docchat-{}-{filename}", uuid::Uuid::new_v4()));
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Some(path),
            Err(err) => {
                tracing::warn!(error = %err, "could not write scratch copy; continuing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_core::DocchatError;
    use docchat_core::assistant::{AssistantId, FileId};
    use docchat_core::config::PollPolicy;
    use docchat_core::knowledge::KeywordKnowledgeResponder;
    use docchat_core::message::UiEvent;
    use docchat_interaction::{FileInfo, TurnMessage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Mock store that records every operation in order.
    struct RecordingStore {
        ops: Mutex<Vec<String>>,
        replies: Mutex<VecDeque<Result<String>>>,
        listed: Mutex<Vec<FileId>>,
        counter: Mutex<u32>,
        fail_upload: bool,
    }

    impl RecordingStore {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                ops: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into_iter().collect()),
                listed: Mutex::new(Vec::new()),
                counter: Mutex::new(0),
                fail_upload: false,
            }
        }

        fn failing_upload() -> Self {
            let mut store = Self::new(Vec::new());
            store.fail_upload = true;
            store
        }

        fn log(&self, op: impl Into<String>) {
            self.ops.lock().unwrap().push(op.into());
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn op_index(&self, op: &str) -> Option<usize> {
            self.ops().iter().position(|o| o == op)
        }
    }

    #[async_trait]
    impl AssistantStore for RecordingStore {
        async fn create_assistant(&self, _profile: &AssistantProfile) -> Result<AssistantId> {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            let id = AssistantId::new(format!("asst-{}", *counter));
            drop(counter);
            self.log(format!("create_assistant:{id}"));
            Ok(id)
        }

        async fn delete_assistant(&self, id: &AssistantId) -> Result<()> {
            self.log(format!("delete_assistant:{id}"));
            Ok(())
        }

        async fn upload_file(&self, filename: &str, _bytes: Vec<u8>) -> Result<FileId> {
            if self.fail_upload {
                return Err(DocchatError::remote_api("upload_file", "500: no"));
            }
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            let id = FileId::new(format!("file-{}", *counter));
            drop(counter);
            self.log(format!("upload:{id}:{filename}"));
            // Visible in the listing right away; polling terminates on the
            // first probe.
            self.listed.lock().unwrap().push(id.clone());
            Ok(id)
        }

        async fn list_files(&self) -> Result<Vec<FileId>> {
            Ok(self.listed.lock().unwrap().clone())
        }

        async fn retrieve_file(&self, id: &FileId) -> Result<FileInfo> {
            Ok(FileInfo {
                id: id.clone(),
                filename: "doc.pdf".to_string(),
                bytes: 3,
                created_at: 0,
            })
        }

        async fn delete_file(&self, id: &FileId) -> Result<()> {
            self.log(format!("delete_file:{id}"));
            self.listed.lock().unwrap().retain(|f| f != id);
            Ok(())
        }

        async fn complete(
            &self,
            _assistant: &AssistantId,
            transcript: &[TurnMessage],
        ) -> Result<String> {
            let opening = transcript
                .first()
                .map(|t| t.content.clone())
                .unwrap_or_default();
            self.log(format!("complete:{opening}"));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DocchatError::remote_api("complete", "script exhausted")))
        }
    }

    fn test_settings() -> AssistantSettings {
        AssistantSettings {
            start_delay_ms: 0,
            poll: PollPolicy {
                initial_interval_ms: 1,
                backoff_factor: 1.0,
                max_interval_ms: 1,
                max_wait_ms: 50,
            },
            ..AssistantSettings::default()
        }
    }

    fn coordinator(
        store: RecordingStore,
    ) -> (
        Arc<ChatCoordinator>,
        Arc<RecordingStore>,
        UnboundedReceiver<UiEvent>,
    ) {
        let (sink, rx) = UiSink::channel();
        let store = Arc::new(store);
        let coordinator = Arc::new(ChatCoordinator::new(
            Arc::clone(&store) as Arc<dyn AssistantStore>,
            test_settings(),
            sink,
        ));
        (coordinator, store, rx)
    }

    async fn wait_for_phase(coordinator: &Arc<ChatCoordinator>, phase: SessionPhase) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.session_phase() != phase {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("phase was never reached");
    }

    async fn wait_for_awaiting_input(coordinator: &Arc<ChatCoordinator>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !coordinator.awaiting_input().await {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("conversation never awaited input");
    }

    fn user_messages(rx: &mut UnboundedReceiver<UiEvent>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UiEvent::Chat(msg) = event {
                if msg.sender == Sender::User {
                    seen.push(msg.content);
                }
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_rapid_messages_start_exactly_one_session() {
        let (coordinator, store, mut rx) = coordinator(RecordingStore::new(vec![Ok(
            "Nice to meet you. TERMINATE".to_string(),
        )]));

        coordinator.handle_user_message("Hello".to_string()).await;
        coordinator.handle_user_message("Hello again".to_string()).await;
        wait_for_phase(&coordinator, SessionPhase::Terminated).await;

        let creates = store
            .ops()
            .iter()
            .filter(|op| op.starts_with("create_assistant"))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(
            store.ops().iter().filter(|op| op.starts_with("complete")).count(),
            1
        );
        // The second message was dropped, not fed into the conversation.
        assert_eq!(user_messages(&mut rx), vec!["Hello".to_string()]);
        assert!(!coordinator.session_failed());
    }

    #[tokio::test]
    async fn test_hello_to_terminate_tears_down_assistant_and_file() {
        let (coordinator, store, _rx) =
            coordinator(RecordingStore::new(vec![Ok("All done. TERMINATE".to_string())]));

        coordinator
            .handle_upload("doc.pdf", b"content".to_vec())
            .await
            .unwrap();
        assert_eq!(
            coordinator.current_profile().await.file_ids,
            vec![FileId::new("file-1")]
        );

        coordinator.handle_user_message("Hello".to_string()).await;
        wait_for_phase(&coordinator, SessionPhase::Terminated).await;

        // The opening turn carried the first UI message.
        assert!(store.op_index("complete:Hello").is_some());
        // Remote teardown ran: the upload-created assistant and the
        // registered file are both gone.
        assert!(store.op_index("delete_assistant:asst-2").is_some());
        assert!(store.op_index("delete_file:file-1").is_some());
        let profile = coordinator.current_profile().await;
        assert!(profile.file_ids.is_empty());
    }

    #[tokio::test]
    async fn test_two_uploads_keep_only_second_file() {
        let (coordinator, store, _rx) = coordinator(RecordingStore::new(Vec::new()));

        coordinator
            .handle_upload("first.pdf", b"one".to_vec())
            .await
            .unwrap();
        coordinator
            .handle_upload("second.pdf", b"two".to_vec())
            .await
            .unwrap();

        let profile = coordinator.current_profile().await;
        assert_eq!(profile.file_ids, vec![FileId::new("file-3")]);

        // The first assistant handle was deleted before the second was
        // constructed, and the first file was released.
        let deleted_first = store.op_index("delete_assistant:asst-2").unwrap();
        let created_second = store.op_index("create_assistant:asst-4").unwrap();
        assert!(deleted_first < created_second);
        assert!(store.op_index("delete_file:file-1").is_some());
    }

    #[tokio::test]
    async fn test_outstanding_request_only_first_message_resolves() {
        let (coordinator, store, mut rx) = coordinator(RecordingStore::new(vec![
            Ok("Could you clarify?".to_string()),
            Ok("Understood. TERMINATE".to_string()),
        ]));

        coordinator.handle_user_message("Hello".to_string()).await;
        wait_for_awaiting_input(&coordinator).await;

        coordinator
            .handle_user_message("first detail".to_string())
            .await;
        coordinator
            .handle_user_message("second detail".to_string())
            .await;
        wait_for_phase(&coordinator, SessionPhase::Terminated).await;

        assert_eq!(
            store.ops().iter().filter(|op| op.starts_with("complete")).count(),
            2
        );
        // Only the first reply entered the conversation.
        assert_eq!(
            user_messages(&mut rx),
            vec!["Hello".to_string(), "first detail".to_string()]
        );
    }

    #[tokio::test]
    async fn test_domain_responder_answers_without_session() {
        let (sink, mut rx) = UiSink::channel();
        let store = Arc::new(RecordingStore::new(Vec::new()));
        let responder = Arc::new(KeywordKnowledgeResponder::from_lines(
            "handbook",
            vec!["Office hours are 9 to 5.".to_string()],
            vec!["office".to_string()],
        ));
        let coordinator = Arc::new(
            ChatCoordinator::new(
                Arc::clone(&store) as Arc<dyn AssistantStore>,
                test_settings(),
                sink,
            )
            .with_responder(responder),
        );

        coordinator
            .handle_user_message("office hours".to_string())
            .await;

        assert_eq!(coordinator.session_phase(), SessionPhase::NotStarted);
        assert!(store.ops().is_empty());

        let mut senders = Vec::new();
        while let Ok(UiEvent::Chat(msg)) = rx.try_recv() {
            senders.push(msg.sender);
        }
        assert_eq!(
            senders,
            vec![Sender::User, Sender::Domain("handbook".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_input_terminates_cleanly() {
        let (coordinator, store, _rx) = coordinator(RecordingStore::new(vec![Ok(
            "Need more info".to_string(),
        )]));

        coordinator.handle_user_message("Hello".to_string()).await;
        wait_for_awaiting_input(&coordinator).await;

        coordinator.cancel_session();
        wait_for_phase(&coordinator, SessionPhase::Terminated).await;

        assert!(!coordinator.session_failed());
        assert!(store.op_index("delete_assistant:asst-1").is_some());
    }

    #[tokio::test]
    async fn test_cancel_during_settle_delay_still_tears_down() {
        let (sink, _rx) = UiSink::channel();
        let store = Arc::new(RecordingStore::new(Vec::new()));
        let mut settings = test_settings();
        // Long enough that the session is still in its settle delay when
        // the cancel arrives.
        settings.start_delay_ms = 60_000;
        let coordinator = Arc::new(ChatCoordinator::new(
            Arc::clone(&store) as Arc<dyn AssistantStore>,
            settings,
            sink,
        ));

        coordinator
            .handle_upload("doc.pdf", b"content".to_vec())
            .await
            .unwrap();
        coordinator.handle_user_message("Hello".to_string()).await;
        assert_eq!(coordinator.session_phase(), SessionPhase::Starting);

        coordinator.cancel_session();
        wait_for_phase(&coordinator, SessionPhase::Terminated).await;

        assert!(!coordinator.session_failed());
        // The upload-created assistant and its registered file were released.
        assert!(store.op_index("delete_assistant:asst-2").is_some());
        assert!(store.op_index("delete_file:file-1").is_some());
        assert!(coordinator.current_profile().await.file_ids.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_terminates_session_as_failed() {
        // Empty script: the first completion fails.
        let (coordinator, store, mut rx) = coordinator(RecordingStore::new(Vec::new()));

        coordinator.handle_user_message("Hello".to_string()).await;
        wait_for_phase(&coordinator, SessionPhase::Terminated).await;

        assert!(coordinator.session_failed());
        // Teardown still released the assistant.
        assert!(store.op_index("delete_assistant:asst-1").is_some());

        let mut saw_failure_notice = false;
        while let Ok(event) = rx.try_recv() {
            if let UiEvent::Chat(msg) = event {
                if msg.sender == Sender::System && msg.content.contains("Session failed") {
                    saw_failure_notice = true;
                }
            }
        }
        assert!(saw_failure_notice);
    }

    #[tokio::test]
    async fn test_upload_failure_reported_to_ui() {
        let (coordinator, _store, mut rx) = coordinator(RecordingStore::failing_upload());

        let err = coordinator
            .handle_upload("doc.pdf", b"content".to_vec())
            .await
            .unwrap_err();
        assert!(err.is_remote_api());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::UploadStatus { label, busy: true } if label == "Uploading"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::UploadStatus { label, busy: false } if label == "Upload failed"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Chat(msg) if msg.sender == Sender::System && msg.content.contains("failed")
        )));
    }
}
