//! Event-tagged SSE records from agent run streams.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde_json::Value;

use super::LineDecoder;
use crate::error::{Error, Result};
use crate::threads::MessageContent;

/// Boxed stream of agent run parts.
pub type RunPartStream = Pin<Box<dyn Stream<Item = Result<RunStreamPart>> + Send>>;

/// One dispatched SSE record: `event:` name plus its JSON `data:`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStreamPart {
    pub event: String,
    pub data: Value,
}

impl RunStreamPart {
    /// Whether this part carries message content (`messages`, `messages/partial`, ...).
    pub fn is_message(&self) -> bool {
        self.event == "messages" || self.event.starts_with("messages/")
    }

    /// Text of the message carried by a message part.
    ///
    /// `messages/*` parts carry an array of messages, the `messages` mode a
    /// `[chunk, metadata]` tuple; in both cases the first entry with content wins.
    pub fn message_text(&self) -> Option<String> {
        if !self.is_message() {
            return None;
        }
        let candidates: Vec<&Value> = match &self.data {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        candidates.into_iter().find_map(|item| {
            let content = item.get("content")?;
            serde_json::from_value::<MessageContent>(content.clone())
                .ok()
                .map(|c| c.text())
        })
    }

    pub fn is_error(&self) -> bool {
        self.event == "error"
    }
}

/// Groups lines into records separated by blank lines.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    lines: LineDecoder,
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning each record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RunStreamPart> {
        let mut parts = Vec::new();
        for line in self.lines.push(chunk) {
            if let Some(part) = self.accept(&line) {
                parts.push(part);
            }
        }
        parts
    }

    /// Flush a record left open when the transport closed.
    pub fn finish(&mut self) -> Option<RunStreamPart> {
        let tail = self.lines.finish().and_then(|line| self.accept(&line));
        tail.or_else(|| self.dispatch())
    }

    fn accept(&mut self, line: &str) -> Option<RunStreamPart> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<RunStreamPart> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.data).join("\n");
        let data = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        Some(RunStreamPart {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Decode a run stream body. Read errors end the stream with an error item.
pub fn decode_run_stream<S, B>(bytes: S) -> RunPartStream
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = SseFrameDecoder::new();

        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let parts = match chunk {
                Ok(chunk) => decoder.push(chunk.as_ref()),
                Err(err) => {
                    yield Err(Error::from(err));
                    return;
                }
            };
            for part in parts {
                yield Ok(part);
            }
        }
        if let Some(part) = decoder.finish() {
            yield Ok(part);
        }
    })
}
