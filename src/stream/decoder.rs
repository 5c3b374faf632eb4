//! Line-oriented decoding of the flow execution stream.

use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use tracing::{info, warn};

use super::StreamEvent;
use crate::error::Error;

/// Boxed stream of flow events, as returned by the flow execution endpoints.
pub type FlowEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

const DATA_PREFIX: &str = "data: ";

/// Incremental newline splitter holding at most one partial line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // The held bytes never contain a newline, so only the new chunk is scanned.
        let mut search = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[search..].iter().position(|b| *b == b'\n') {
            let end = search + offset;
            lines.push(decode_line(&self.buf[start..end]));
            start = end + 1;
            search = start;
        }
        self.buf.drain(..start);
        lines
    }

    /// Flush the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = decode_line(&self.buf);
        self.buf.clear();
        Some(line)
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Parse one `data: ` line. Other lines yield `None`; malformed payloads are logged.
fn parse_data_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(
                name: "flow.stream.malformed",
                error = %err,
                payload = %payload,
                "Failed to parse SSE data"
            );
            None
        }
    }
}

/// Decode a chunked byte stream into flow events.
///
/// A chunk error ends the stream with the transport-failure pair.
pub fn decode_flow_events<S, B, E>(bytes: S) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = LineDecoder::new();

        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let lines = match chunk {
                Ok(chunk) => decoder.push(chunk.as_ref()),
                Err(err) => {
                    let message = err.to_string();
                    warn!(name: "flow.stream.interrupted", error = %message, "Flow stream read failed");
                    for event in StreamEvent::transport_failure(&message) {
                        yield event;
                    }
                    return;
                }
            };
            for line in lines {
                if let Some(event) = parse_data_line(&line) {
                    yield event;
                }
            }
        }

        if let Some(event) = decoder.finish().as_deref().and_then(parse_data_line) {
            yield event;
        }
    }
}

/// Send a streaming execute request and decode its body.
///
/// Send errors, non-success statuses and empty bodies all end in the
/// transport-failure pair instead of an error.
pub fn open_flow_stream(request: reqwest::RequestBuilder) -> FlowEventStream {
    Box::pin(async_stream::stream! {
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let message = Error::from(err).to_string();
                warn!(name: "flow.stream.failed", error = %message, "Flow stream request failed");
                for event in StreamEvent::transport_failure(&message) {
                    yield event;
                }
                return;
            }
        };

        let status = response.status();
        let failure = if !status.is_success() {
            Some(format!("HTTP error! status: {}", status.as_u16()))
        } else if response.content_length() == Some(0) {
            Some(Error::MissingBody.to_string())
        } else {
            None
        };
        if let Some(message) = failure {
            warn!(name: "flow.stream.failed", error = %message, "Flow stream rejected");
            for event in StreamEvent::transport_failure(&message) {
                yield event;
            }
            return;
        }

        info!(name: "flow.stream.opened", url = %response.url(), "Flow stream opened");
        let events = decode_flow_events(response.bytes_stream());
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            yield event;
        }
    })
}

/// Stream that only yields the transport-failure pair.
pub(crate) fn failed_flow_stream(message: String) -> FlowEventStream {
    warn!(name: "flow.stream.failed", error = %message, "Flow stream could not be opened");
    Box::pin(futures::stream::iter(StreamEvent::transport_failure(&message)))
}
