//! Decoder for OpenAI-style streamed chat completions.
//!
//! The transport delivers `data: <json>` lines, terminated by
//! `data: [DONE]`. Each JSON payload carries the next piece of text in
//! `choices[0].delta.content`. Byte chunks may end mid-line or even mid
//! UTF-8 sequence, so bytes are buffered until a full line is available.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{StreamError, StreamResult};

/// Decoded unit of a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Next piece of generated text
    Delta(String),
    /// The `[DONE]` sentinel
    Done,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Line-buffering decoder for one completion stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.handle_line(&line, &mut events) {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Decode a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line, &mut events);
        }
        events
    }

    /// Returns true once the stream is done.
    fn handle_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) -> bool {
        let line = String::from_utf8_lossy(raw);
        match decode_line(&line) {
            Ok(Some(SseEvent::Done)) => {
                debug!("Completion stream finished");
                self.done = true;
                events.push(SseEvent::Done);
                true
            }
            Ok(Some(event)) => {
                events.push(event);
                false
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Skipping stream line: {}", e);
                false
            }
        }
    }
}

/// Decode a single line. Blank lines, comments and non-data fields yield `None`.
pub fn decode_line(line: &str) -> StreamResult<Option<SseEvent>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(payload) = line.strip_prefix("data:") else {
        if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
            return Ok(None);
        }
        return Err(StreamError::MalformedLine(line.to_string()));
    };

    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: ChatChunk = serde_json::from_str(payload)?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());
    Ok(content.map(SseEvent::Delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[test]
    fn test_decode_delta_lines() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n\n", data("Hello"), data(" world"));

        let events = decoder.push(input.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hello".to_string()),
                SseEvent::Delta(" world".to_string()),
                SseEvent::Done,
            ]
        );
        assert!(decoder.is_done());
        assert!(decoder.push(data("ignored").as_bytes()).is_empty());
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        let mut decoder = SseDecoder::new();
        let input = data("héllo");
        let bytes = input.as_bytes();
        let split = input.find('é').unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(events, vec![SseEvent::Delta("héllo".to_string())]);
    }

    #[test]
    fn test_skips_noise() {
        let mut decoder = SseDecoder::new();
        let input = ": keep-alive\nevent: message\ndata: {not json}\ndata: {\"choices\":[{\"delta\":{}}]}\n";
        assert!(decoder.push(input.as_bytes()).is_empty());
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_finish_decodes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let line = data("tail");
        assert!(decoder.push(line.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Delta("tail".to_string())]);
    }

    #[test]
    fn test_decode_line_errors() {
        assert!(matches!(
            decode_line("garbage"),
            Err(StreamError::MalformedLine(_))
        ));
        assert!(matches!(decode_line("data: {"), Err(StreamError::Json(_))));
        assert_eq!(decode_line("data: [DONE]\r").unwrap(), Some(SseEvent::Done));
    }
}
