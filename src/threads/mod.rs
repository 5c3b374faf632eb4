//! Conversation threads for agents.
//!
//! Threads live on the agent backend and are tied to an assistant through the
//! `assistant_id` key of their metadata. The client keeps a read-mostly copy
//! through [`ThreadReconciler`], which merges the server list with at most one
//! optimistically created thread.
//!
//! # Example
//!
//! ```rust
//! use agentflow::threads::ThreadReconciler;
//!
//! let mut threads = ThreadReconciler::new("assistant-1");
//! threads.insert_optimistic("t-1", "Draft the weekly report");
//!
//! let listed = threads.threads();
//! assert_eq!(listed.len(), 1);
//! assert_eq!(listed[0].preview, "Draft the weekly report");
//! ```

mod api;
mod reconciler;

pub use api::{CreatedThread, RunInput, ThreadsApi, format_answers};
pub use reconciler::{RefreshTicket, ThreadReconciler, ThreadSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Preview shown for threads without a human message.
pub const DEFAULT_PREVIEW: &str = "New conversation";

/// Characters kept from the first human message.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Message content - either plain text or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Plain text, joining the text parts with single spaces.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A LangChain-style chat message as stored in thread state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChatMessage {
    /// A human message with text content.
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            kind: Some("human".to_string()),
            role: None,
            content: MessageContent::Text(text.into()),
            id: None,
        }
    }

    pub fn is_human(&self) -> bool {
        self.kind.as_deref() == Some("human") || self.role.as_deref() == Some("user")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadValues {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Preview text for a message list: the first human message, truncated.
pub fn preview_for(messages: &[ChatMessage]) -> String {
    let Some(first) = messages.iter().find(|m| m.is_human()) else {
        return DEFAULT_PREVIEW.to_string();
    };
    truncate_preview(&first.content.text())
}

/// Keep the first [`PREVIEW_MAX_CHARS`] characters, marking cuts with `"..."`.
pub fn truncate_preview(text: &str) -> String {
    if text.is_empty() {
        return DEFAULT_PREVIEW.to_string();
    }
    match text.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Thread record as returned by the agent backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub values: Option<Value>,
}

/// A thread as displayed in an assistant's history list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationThread {
    pub thread_id: String,
    pub assistant_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
    pub values: Option<ThreadValues>,
    pub preview: String,
}

impl ConversationThread {
    /// Build the display record for a server thread.
    ///
    /// Values that do not hold a message list are dropped rather than rejected.
    pub fn from_record(record: ThreadRecord, assistant_id: &str) -> Self {
        let values = record
            .values
            .and_then(|v| serde_json::from_value::<ThreadValues>(v).ok());
        let preview = values
            .as_ref()
            .map_or_else(|| DEFAULT_PREVIEW.to_string(), |v| preview_for(&v.messages));
        Self {
            thread_id: record.thread_id,
            assistant_id: assistant_id.to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            metadata: record.metadata,
            values,
            preview,
        }
    }

    /// A locally created thread the server has not reported yet.
    pub fn optimistic(
        thread_id: impl Into<String>,
        assistant_id: impl Into<String>,
        preview: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            created_at: now,
            updated_at: now,
            metadata: Map::new(),
            values: None,
            preview: preview.into(),
        }
    }
}

/// Checkpointed state of a thread, used to restore its conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadState {
    #[serde(default)]
    pub values: ThreadValues,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default)]
    pub checkpoint: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ThreadState {
    pub fn preview(&self) -> String {
        preview_for(&self.values.messages)
    }

    /// Whether the graph is paused waiting on input (e.g. an ask-user interrupt).
    pub fn is_interrupted(&self) -> bool {
        !self.next.is_empty()
    }
}
