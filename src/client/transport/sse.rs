//! Server-Sent Events framing for the push channel.

use crate::shared::messaging::ChatMessage;

use super::PushEvent;

/// Event names that carry a chat message
const MESSAGE_EVENTS: [&str; 2] = ["new_message", "message"];

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    /// Decode the frame into a push event, skipping keep-alives and
    /// events this client does not handle
    pub fn into_event(self) -> Option<PushEvent> {
        if !MESSAGE_EVENTS.contains(&self.event.as_str()) {
            tracing::debug!("[PUSH] ignoring '{}' event", self.event);
            return None;
        }
        match serde_json::from_str::<ChatMessage>(&self.data) {
            Ok(message) => Some(PushEvent::NewMessage(message)),
            Err(e) => {
                tracing::warn!(
                    "[PUSH] failed to parse '{}' payload as ChatMessage: {} | data: {}",
                    self.event,
                    e,
                    self.data
                );
                None
            }
        }
    }
}

/// Incremental SSE parser; feed it raw chunks as they arrive
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                frames.extend(self.dispatch());
                continue;
            }
            // Comment / keep-alive
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                "id" | "retry" => {}
                _ if line.starts_with('{') && line.ends_with('}') && self.data.is_empty() => {
                    // Some proxies flatten the stream to bare JSON lines
                    frames.push(SseFrame {
                        event: "message".to_string(),
                        data: line.to_string(),
                    });
                }
                _ => tracing::debug!("[PUSH] skipping unrecognised line: {}", line),
            }
        }

        frames
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
