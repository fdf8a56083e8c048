//! `text/event-stream` framing.
//!
//! [`encode_sse`] writes one frame per event as `data: <json>\n\n`.
//! [`SseParser`] is the incremental reader side: it accepts arbitrary text
//! chunks and yields complete events once their blank-line delimiter arrives.

use crate::Frame;
use bytes::Bytes;

/// Encode a frame as a single SSE event.
pub fn encode_sse(frame: &Frame) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(frame)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type from `event:`, `message` when absent.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl Default for SseEvent {
    fn default() -> Self {
        Self {
            event: "message".to_string(),
            data: String::new(),
            id: None,
        }
    }
}

/// Incremental SSE parser. Handles LF, CRLF and bare CR line endings,
/// comment lines, multi-line data and a leading BOM.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current: SseEvent,
    has_data: bool,
    bom_checked: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.current.event = value.to_string(),
            "data" => {
                self.current.data.push_str(value);
                self.current.data.push('\n');
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.current.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if !self.has_data {
            self.current = SseEvent::default();
            return None;
        }
        let mut event = std::mem::take(&mut self.current);
        if event.data.ends_with('\n') {
            event.data.pop();
        }
        if event.event.is_empty() {
            event.event = "message".to_string();
        }
        self.has_data = false;
        Some(event)
    }

    /// Feed a chunk and return the events it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        if !self.bom_checked && !self.buffer.is_empty() {
            self.bom_checked = true;
            if let Some(rest) = self.buffer.strip_prefix('\u{FEFF}') {
                self.buffer = rest.to_string();
            }
        }

        let buffer = std::mem::take(&mut self.buffer);
        let bytes = buffer.as_bytes();
        let mut events = Vec::new();
        let mut start = 0usize;

        while let Some(rel) = bytes[start..].iter().position(|b| *b == b'\r' || *b == b'\n') {
            let pos = start + rel;
            let next_start = if bytes[pos] == b'\n' {
                pos + 1
            } else if pos + 1 < bytes.len() {
                if bytes[pos + 1] == b'\n' {
                    pos + 2
                } else {
                    pos + 1
                }
            } else {
                // Trailing CR: wait to see whether LF follows.
                break;
            };

            let line = &buffer[start..pos];
            start = next_start;
            if line.is_empty() {
                events.extend(self.dispatch());
            } else {
                self.process_line(line);
            }
        }

        self.buffer = buffer[start..].to_string();
        events
    }

    /// Whether a partial line or an undispatched event is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.has_data
    }

    /// Dispatch whatever is buffered at end of stream.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(line.trim_end_matches('\r'));
        }
        self.dispatch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_one_data_line_per_frame() {
        let bytes = encode_sse(&Frame::text_delta("hi")).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "data: {\"type\":\"text-delta\",\"delta\":\"hi\"}\n\n"
        );
    }

    #[test]
    fn events_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"a\"").is_empty());
        assert!(parser.has_pending());
        let events = parser.feed(":1}\n\ndata: x\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[0].event, "message");
        let events = parser.feed("\n");
        assert_eq!(events[0].data, "x");
        assert!(!parser.has_pending());
    }

    #[test]
    fn crlf_and_bare_cr() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: a\r\n\r\ndata: b\r\r");
        assert_eq!(events.len(), 1);
        // The final CR might be the first half of CRLF.
        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "b");
    }

    #[test]
    fn comments_multiline_data_and_fields() {
        let mut parser = SseParser::new();
        let events =
            parser.feed("\u{FEFF}: keep-alive\nevent: frame\nid: 7\ndata: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "frame");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: ping\n\n").is_empty());
        let events = parser.feed("data: x\n\n");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn flush_emits_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: tail").is_empty());
        let event = parser.flush().unwrap();
        assert_eq!(event.data, "tail");
        assert!(parser.flush().is_none());
    }
}
