//! Server-sent events line parser.

use std::io::BufRead;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `message` when the server sent none.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental parser. Feed it one line at a time (without the newline).
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    /// Consume one line. Returns an event when a blank line completes one.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.id.clone(),
        })
    }
}

/// Blocking event reader over a byte stream.
///
/// A read error leaves the reader usable: a line cut short by a socket
/// read timeout is kept and completed by the next call.
pub struct SseReader<R: BufRead> {
    reader: R,
    parser: SseParser,
    line: String,
}

impl<R: BufRead> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: SseParser::default(),
            line: String::new(),
        }
    }

    /// Next complete event, or `None` at end of stream.
    pub fn next_event(&mut self) -> Result<Option<SseEvent>> {
        loop {
            let n = self
                .reader
                .read_line(&mut self.line)
                .context("failed to read event stream")?;
            if n == 0 {
                // A final event without a trailing blank line still counts.
                let tail = std::mem::take(&mut self.line);
                if let Some(event) = self.parser.push_line(&tail) {
                    return Ok(Some(event));
                }
                return Ok(self.parser.push_line(""));
            }
            let event = self.parser.push_line(&self.line);
            self.line.clear();
            if event.is_some() {
                return Ok(event);
            }
        }
    }
}

/// Whether `err` is a read timeout rather than a broken stream.
pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>().is_some_and(|e| {
        matches!(
            e.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_named_and_default_events() {
        let body = "event: endpoint\ndata: /messages/?session_id=abc\n\n: keepalive\n\ndata: {\"id\":1}\n\n";
        let mut reader = SseReader::new(Cursor::new(body));
        let first = reader.next_event().unwrap().unwrap();
        assert_eq!(first.event, "endpoint");
        assert_eq!(first.data, "/messages/?session_id=abc");
        let second = reader.next_event().unwrap().unwrap();
        assert_eq!(second.event, "message");
        assert_eq!(second.data, r#"{"id":1}"#);
        assert_eq!(reader.next_event().unwrap(), None);
    }

    /// Yields its chunks in order, failing with a timeout between them.
    struct Stalling {
        chunks: Vec<&'static [u8]>,
        stalled: bool,
    }

    impl std::io::Read for Stalling {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            if !self.stalled {
                self.stalled = true;
                return Err(std::io::ErrorKind::TimedOut.into());
            }
            self.stalled = false;
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn resumes_after_read_timeout() {
        let stream = Stalling {
            chunks: vec![&b"event: endpoint\nda"[..], &b"ta: /messages\n\n"[..]],
            stalled: false,
        };
        let mut reader = SseReader::new(std::io::BufReader::new(stream));
        let err = reader.next_event().unwrap_err();
        assert!(is_timeout(&err));
        let err = reader.next_event().unwrap_err();
        assert!(is_timeout(&err));
        let event = reader.next_event().unwrap().unwrap();
        assert_eq!(event.event, "endpoint");
        assert_eq!(event.data, "/messages");
        assert!(!is_timeout(&anyhow::anyhow!("closed")));
    }

    #[test]
    fn joins_multiline_data_and_handles_crlf() {
        let mut parser = SseParser::default();
        assert!(parser.push_line("id: 7\r\n").is_none());
        assert!(parser.push_line("data: a\r\n").is_none());
        assert!(parser.push_line("data:b\r\n").is_none());
        let event = parser.push_line("\r\n").unwrap();
        assert_eq!(event.data, "a\nb");
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[test]
    fn trailing_event_without_blank_line() {
        let mut reader = SseReader::new(Cursor::new("data: last"));
        assert_eq!(reader.next_event().unwrap().unwrap().data, "last");
    }
}
