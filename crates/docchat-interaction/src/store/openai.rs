//! OpenAiAssistantStore - REST implementation of [`AssistantStore`].
//!
//! Talks to the OpenAI HTTP API directly. Configuration priority:
//! ~/.config/docchat/secret.json > environment variables.
//!
//! Completions run through the assistant resource (thread + run), not the
//! bare chat endpoint, so retrieval over the attached file takes part in
//! every answer. One conversation thread is kept per assistant handle.

use super::{AssistantStore, FileInfo};
use crate::conversation::TurnMessage;
use crate::secret::SecretStorage;
use async_trait::async_trait;
use docchat_core::assistant::{AssistantId, AssistantProfile, FileId, ToolKind};
use docchat_core::config::DEFAULT_MODEL;
use docchat_core::error::{DocchatError, Result};
use docchat_core::message::Sender;
use reqwest::{Client, Response, header::HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.openai.com/v1";
// The v1 assistants surface matches the request bodies below
// (`file_ids` on the assistant, tool type `retrieval`).
const ASSISTANTS_BETA_HEADER: &str = "assistants=v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const RUN_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RUN_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Store implementation that talks to the OpenAI HTTP API.
pub struct OpenAiAssistantStore {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    /// Conversation thread bound to each assistant handle.
    threads: Mutex<HashMap<AssistantId, String>>,
}

impl OpenAiAssistantStore {
    /// Creates a new store with the provided API key and default model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Loads configuration from ~/.config/docchat/secret.json or environment
    /// variables.
    ///
    /// Priority:
    /// 1. ~/.config/docchat/secret.json
    /// 2. Environment variables (OPENAI_API_KEY, OPENAI_MODEL_NAME)
    ///
    /// Model name defaults to `gpt-4o` if not specified.
    pub fn try_from_env() -> Result<Self> {
        if let Ok(storage) = SecretStorage::new() {
            if let Ok(secret_config) = storage.load() {
                if let Some(openai_config) = secret_config.openai {
                    let model = openai_config
                        .model_name
                        .unwrap_or_else(|| DEFAULT_MODEL.into());
                    return Ok(Self::new(openai_config.api_key, model));
                }
            }
        }

        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            DocchatError::config(
                "OPENAI_API_KEY not found in ~/.config/docchat/secret.json or environment variables",
            )
        })?;
        let model = env::var("OPENAI_MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Ok(Self::new(api_key, model))
    }

    /// Overrides the default model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API base URL (for testing against a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn check(operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocchatError::remote_api(
                operation,
                format!("{status}: {body}"),
            ));
        }
        Ok(response)
    }

    fn request_err(operation: &str) -> impl Fn(reqwest::Error) -> DocchatError + use<> {
        let operation = operation.to_string();
        move |err| DocchatError::remote_api(&operation, err.to_string())
    }

    fn cached_thread(&self, assistant: &AssistantId) -> Result<Option<String>> {
        Ok(self
            .threads
            .lock()
            .map_err(|_| DocchatError::internal("thread cache poisoned"))?
            .get(assistant)
            .cloned())
    }

    /// Returns the conversation thread for `assistant`, creating it on
    /// first use.
    async fn thread_for(&self, assistant: &AssistantId) -> Result<String> {
        if let Some(existing) = self.cached_thread(assistant)? {
            return Ok(existing);
        }

        let response = self
            .client
            .post(format!("{}/threads", self.base_url))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::request_err("create_thread"))?;
        let created: ThreadObject = Self::check("create_thread", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("create_thread"))?;

        self.threads
            .lock()
            .map_err(|_| DocchatError::internal("thread cache poisoned"))?
            .insert(assistant.clone(), created.id.clone());
        tracing::info!(assistant = %assistant, thread = %created.id, "created conversation thread");
        Ok(created.id)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/threads/{thread_id}", self.base_url))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .send()
            .await
            .map_err(Self::request_err("delete_thread"))?;
        Self::check("delete_thread", response).await?;
        Ok(())
    }

    async fn append_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let body = CreateMessageRequest {
            role: "user",
            content,
        };
        let response = self
            .client
            .post(format!("{}/threads/{thread_id}/messages", self.base_url))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .json(&body)
            .send()
            .await
            .map_err(Self::request_err("complete"))?;
        Self::check("complete", response).await?;
        Ok(())
    }

    /// Starts a run on `thread_id` and polls it to a terminal status.
    async fn run_to_completion(&self, assistant: &AssistantId, thread_id: &str) -> Result<()> {
        let body = CreateRunRequest {
            assistant_id: assistant.as_str(),
        };
        let response = self
            .client
            .post(format!("{}/threads/{thread_id}/runs", self.base_url))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .json(&body)
            .send()
            .await
            .map_err(Self::request_err("complete"))?;
        let mut run: RunObject = Self::check("complete", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("complete"))?;

        let started = Instant::now();
        loop {
            match run.status.as_str() {
                "completed" => return Ok(()),
                "queued" | "in_progress" | "cancelling" => {
                    if started.elapsed() >= RUN_POLL_TIMEOUT {
                        return Err(DocchatError::remote_api(
                            "complete",
                            format!("run {} did not finish in time", run.id),
                        ));
                    }
                    tokio::time::sleep(RUN_POLL_INTERVAL).await;
                    let response = self
                        .client
                        .get(format!(
                            "{}/threads/{thread_id}/runs/{}",
                            self.base_url, run.id
                        ))
                        .header("Authorization", self.bearer())
                        .header(
                            "OpenAI-Beta",
                            HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
                        )
                        .send()
                        .await
                        .map_err(Self::request_err("complete"))?;
                    run = Self::check("complete", response)
                        .await?
                        .json()
                        .await
                        .map_err(Self::request_err("complete"))?;
                }
                other => {
                    return Err(DocchatError::remote_api(
                        "complete",
                        format!("run {} ended with status {other}", run.id),
                    ));
                }
            }
        }
    }

    /// Fetches the newest assistant message on `thread_id`.
    async fn latest_assistant_reply(&self, thread_id: &str) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "{}/threads/{thread_id}/messages?order=desc&limit=1",
                self.base_url
            ))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .send()
            .await
            .map_err(Self::request_err("complete"))?;
        let listing: ThreadMessageList = Self::check("complete", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("complete"))?;

        listing
            .data
            .into_iter()
            .find(|message| message.role == "assistant")
            .and_then(ThreadMessage::into_text)
            .ok_or_else(|| {
                DocchatError::remote_api("complete", "thread contained no assistant reply")
            })
    }
}

#[async_trait]
impl AssistantStore for OpenAiAssistantStore {
    async fn create_assistant(&self, profile: &AssistantProfile) -> Result<AssistantId> {
        let body = CreateAssistantRequest {
            model: &profile.model,
            instructions: &profile.instructions,
            tools: &profile.tools,
            file_ids: &profile.file_ids,
        };
        let response = self
            .client
            .post(format!("{}/assistants", self.base_url))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .json(&body)
            .send()
            .await
            .map_err(Self::request_err("create_assistant"))?;
        let created: AssistantObject = Self::check("create_assistant", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("create_assistant"))?;

        let id = AssistantId::new(created.id);
        tracing::info!(assistant = %id, "created remote assistant");
        Ok(id)
    }

    async fn delete_assistant(&self, id: &AssistantId) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/assistants/{}", self.base_url, id))
            .header("Authorization", self.bearer())
            .header(
                "OpenAI-Beta",
                HeaderValue::from_static(ASSISTANTS_BETA_HEADER),
            )
            .send()
            .await
            .map_err(Self::request_err("delete_assistant"))?;
        Self::check("delete_assistant", response).await?;

        let thread = self
            .threads
            .lock()
            .map_err(|_| DocchatError::internal("thread cache poisoned"))?
            .remove(id);
        if let Some(thread_id) = thread {
            if let Err(err) = self.delete_thread(&thread_id).await {
                tracing::warn!(thread = %thread_id, error = %err,
                    "conversation thread could not be deleted");
            }
        }
        tracing::info!(assistant = %id, "deleted remote assistant");
        Ok(())
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<FileId> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(Self::request_err("upload_file"))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(Self::request_err("upload_file"))?;
        let uploaded: FileObject = Self::check("upload_file", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("upload_file"))?;

        tracing::info!(file = %uploaded.id, filename, "uploaded file to remote store");
        Ok(FileId::new(uploaded.id))
    }

    async fn list_files(&self) -> Result<Vec<FileId>> {
        let response = self
            .client
            .get(format!("{}/files", self.base_url))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(Self::request_err("list_files"))?;
        let listing: FileListResponse = Self::check("list_files", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("list_files"))?;
        Ok(listing
            .data
            .into_iter()
            .map(|f| FileId::new(f.id))
            .collect())
    }

    async fn retrieve_file(&self, id: &FileId) -> Result<FileInfo> {
        let response = self
            .client
            .get(format!("{}/files/{}", self.base_url, id))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(Self::request_err("retrieve_file"))?;
        let file: FileObject = Self::check("retrieve_file", response)
            .await?
            .json()
            .await
            .map_err(Self::request_err("retrieve_file"))?;
        Ok(FileInfo {
            id: FileId::new(file.id),
            filename: file.filename.unwrap_or_default(),
            bytes: file.bytes.unwrap_or_default(),
            created_at: file.created_at.unwrap_or_default(),
        })
    }

    async fn delete_file(&self, id: &FileId) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/files/{}", self.base_url, id))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(Self::request_err("delete_file"))?;
        Self::check("delete_file", response).await?;
        tracing::info!(file = %id, "deleted remote file");
        Ok(())
    }

    async fn complete(
        &self,
        assistant: &AssistantId,
        transcript: &[TurnMessage],
    ) -> Result<String> {
        let thread_id = self.thread_for(assistant).await?;

        // The thread accumulates turns; only the newest human message needs
        // appending per call.
        if let Some(turn) = transcript.last().filter(|t| t.sender == Sender::User) {
            self.append_user_message(&thread_id, &turn.content).await?;
        }

        self.run_to_completion(assistant, &thread_id).await?;
        self.latest_assistant_reply(&thread_id).await
    }
}

#[derive(Serialize)]
struct CreateAssistantRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    tools: &'a [ToolKind],
    file_ids: &'a [FileId],
}

#[derive(Deserialize)]
struct AssistantObject {
    id: String,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Deserialize)]
struct FileListResponse {
    data: Vec<FileObject>,
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct ThreadMessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    content: Vec<MessageContent>,
}

impl ThreadMessage {
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find_map(|part| part.text)
            .map(|text| text.value)
    }
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}
