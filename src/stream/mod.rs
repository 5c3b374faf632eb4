//! Server-sent event consumers.
//!
//! Two framings are consumed:
//!
//! - Flow execution logs (`POST /flows/{id}/execute-stream`): one JSON
//!   [`StreamEvent`] per `data: ` line. Transport failures never surface as
//!   errors; they are turned into a final failed [`StreamEvent`] pair.
//! - Agent run streams (`POST /threads/{id}/runs/stream`): full
//!   `event:`/`data:` records, surfaced as [`RunStreamPart`]s.
//!
//! # Example
//!
//! ```rust
//! use agentflow::stream::{StreamEvent, decode_flow_events};
//! use futures::StreamExt;
//!
//! # tokio_test_block_on(async {
//! let chunks = vec![
//!     Ok::<_, std::io::Error>(b"data: {\"type\":\"stream\",\"status\":\"succ".to_vec()),
//!     Ok(b"ess\",\"message\":\"step 1\",\"timestamp\":\"t\"}\n\n".to_vec()),
//! ];
//! let events: Vec<StreamEvent> = decode_flow_events(futures::stream::iter(chunks))
//!     .collect()
//!     .await;
//! assert_eq!(events.len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod decoder;
mod run_events;

pub use decoder::{FlowEventStream, LineDecoder, decode_flow_events, open_flow_stream};
pub(crate) use decoder::failed_flow_stream;
pub use run_events::{RunPartStream, RunStreamPart, SseFrameDecoder, decode_run_stream};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flows::Outcome;

/// Status tag carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Success,
    Failed,
}

/// One decoded flow execution event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental progress.
    Stream(ProgressEvent),
    /// Terminal result; always the last event of a well-behaved stream.
    Complete(CompletionEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl CompletionEvent {
    /// Logical outcome, folding in the `status` field of the result payload.
    pub fn outcome(&self) -> Outcome {
        Outcome::evaluate(self.success, self.data.as_ref())
    }
}

impl StreamEvent {
    /// The event pair emitted in place of a stream that failed in transport.
    pub fn transport_failure(message: &str) -> [Self; 2] {
        let timestamp = chrono::Utc::now().to_rfc3339();
        [
            Self::Stream(ProgressEvent {
                status: ProgressStatus::Failed,
                message: message.to_string(),
                timestamp: timestamp.clone(),
            }),
            Self::Complete(CompletionEvent {
                success: false,
                data: None,
                error: Some(message.to_string()),
                execution_time: None,
                timestamp,
                metadata: None,
            }),
        ]
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Artifact returned by an agent tool call asking the client to run a flow.
///
/// The `run_id` is generated by the agent so it can look the run up later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowExecutionArtifact {
    pub flow_id: String,
    #[serde(default)]
    pub flow_name: String,
    pub run_id: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl FlowExecutionArtifact {
    pub const KIND: &'static str = "flow_execution_request";

    /// Recognize a tool-call artifact. Requires `type`, `flow_id` and `run_id`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("type").and_then(Value::as_str) != Some(Self::KIND) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}
