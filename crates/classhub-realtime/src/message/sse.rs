//! Incremental decoder for the `text/event-stream` line protocol.
//!
//! Bytes arrive in arbitrary chunks; lines and UTF-8 sequences may be split
//! across chunk boundaries. The decoder buffers partial lines and emits a
//! frame on every blank line that follows at least one `data:` field.

use serde::{Deserialize, Serialize};

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseFrame {
    /// Event name (`message` when unnamed).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
    /// Reconnect hint sent by the server, in milliseconds.
    pub retry: Option<u64>,
}

impl SseFrame {
    /// Frame with the given event name and data.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Unnamed frame (`message`).
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT, data)
    }

    /// Whether this is an unnamed frame.
    pub fn is_default_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

/// Stateful line parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, unterminated line.
    line: Vec<u8>,
    /// A `\r` ended the previous line; swallow a directly following `\n`.
    skip_lf: bool,
    /// Nothing has been decoded yet; a leading BOM must be stripped.
    at_start: bool,
    /// `event:` field of the frame being assembled.
    event: Option<String>,
    /// `data:` lines of the frame being assembled.
    data: Option<Vec<String>>,
    /// Last event id (persists across frames).
    last_id: Option<String>,
    /// `retry:` field of the frame being assembled.
    retry: Option<u64>,
}

impl SseDecoder {
    /// Creates a decoder positioned at the start of a stream.
    pub fn new() -> Self {
        Self {
            at_start: true,
            ..Self::default()
        }
    }

    /// Feeds a chunk and returns every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut out = Vec::new();

        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }

        out
    }

    fn end_line(&mut self, out: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if self.at_start {
            self.at_start = false;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }
        self.process_line(&line, out);
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseFrame>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.get_or_insert_with(Vec::new).push(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    self.retry = value.parse().ok();
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseFrame>) {
        let event = self.event.take().filter(|e| !e.is_empty());
        let retry = self.retry.take();

        let Some(lines) = self.data.take() else {
            return;
        };

        out.push(SseFrame {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: lines.join("\n"),
            id: self.last_id.clone(),
            retry,
        });
    }
}
