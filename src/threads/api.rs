use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::{ChatMessage, ConversationThread, ThreadRecord, ThreadState};
use crate::client::Client;
use crate::error::Result;
use crate::stream::{RunPartStream, decode_run_stream};

/// Stream modes requested for every agent run.
const RUN_STREAM_MODES: [&str; 2] = ["messages", "updates"];

/// Input for one agent run on a thread.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    /// New messages; an empty list sends `input: null` (e.g. when resuming).
    pub messages: Vec<ChatMessage>,
    /// Resume command for an interrupted graph.
    pub command: Option<Value>,
    /// Config override so older threads pick up the assistant's latest settings.
    pub configurable: Option<Map<String, Value>>,
}

impl RunInput {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::human(text)],
            ..Self::default()
        }
    }

    /// Resume an interrupted run with the user's answer and no new messages.
    pub fn resume(answer: impl Into<String>) -> Self {
        Self {
            command: Some(json!({ "resume": answer.into() })),
            ..Self::default()
        }
    }
}

/// Format answers to an ask-user interrupt as a numbered list.
///
/// `["Friday", "Yes"]` becomes `"1. Friday\n\n2. Yes"`.
pub fn format_answers<S: AsRef<str>>(answers: &[S]) -> String {
    answers
        .iter()
        .enumerate()
        .map(|(idx, answer)| format!("{}. {}", idx + 1, answer.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Serialize)]
struct CreateThreadRequest<'a> {
    metadata: ThreadMetadataFilter<'a>,
}

#[derive(Serialize)]
struct SearchThreadsRequest<'a> {
    metadata: ThreadMetadataFilter<'a>,
    limit: usize,
}

#[derive(Serialize)]
struct ThreadMetadataFilter<'a> {
    assistant_id: &'a str,
}

#[derive(Serialize)]
struct RunStreamRequest<'a> {
    assistant_id: &'a str,
    input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a Value>,
    stream_mode: [&'static str; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<Value>,
}

/// Minimal view of a freshly created thread.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedThread {
    pub thread_id: String,
}

/// Threads API client.
#[derive(Debug)]
pub struct ThreadsApi<'a> {
    client: &'a Client,
}

impl<'a> ThreadsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create a thread tagged with the assistant it belongs to.
    pub async fn create(&self, assistant_id: &str) -> Result<CreatedThread> {
        let body = CreateThreadRequest {
            metadata: ThreadMetadataFilter { assistant_id },
        };
        self.client.post("/threads", &body).await
    }

    /// All threads of an assistant, with previews, in server order.
    #[instrument(skip(self))]
    pub async fn search(&self, assistant_id: &str) -> Result<Vec<ConversationThread>> {
        let body = SearchThreadsRequest {
            metadata: ThreadMetadataFilter { assistant_id },
            limit: self.client.search_limit(),
        };
        let records: Vec<ThreadRecord> = self.client.post("/threads/search", &body).await?;
        debug!(count = records.len(), "Threads fetched");
        Ok(records
            .into_iter()
            .map(|record| ConversationThread::from_record(record, assistant_id))
            .collect())
    }

    /// Checkpointed state of a thread.
    pub async fn state(&self, thread_id: &str) -> Result<ThreadState> {
        self.client
            .get(&format!("/threads/{thread_id}/state"))
            .await
    }

    /// Start a run on a thread and stream its parts.
    pub async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        input: &RunInput,
    ) -> Result<RunPartStream> {
        let body = RunStreamRequest {
            assistant_id,
            input: (!input.messages.is_empty()).then(|| json!({ "messages": input.messages })),
            command: input.command.as_ref(),
            stream_mode: RUN_STREAM_MODES,
            config: input
                .configurable
                .as_ref()
                .map(|configurable| json!({ "configurable": configurable })),
        };
        let url = self.client.url(&format!("/threads/{thread_id}/runs/stream"))?;
        let response = self.client.http().post(url).json(&body).send().await?;
        let response = Client::check_status(response).await?;
        Ok(decode_run_stream(response.bytes_stream()))
    }
}
