//! Server-Sent Events decoding for job step streams.
//!
//! Frames are `field: value` lines terminated by a blank line. Only the
//! `event` and `data` fields are used; `id`, `retry` and `:` comments are
//! skipped.

use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use crate::error::StreamError;
use crate::models::step::{StepUpdate, StreamEvent};

/// Stream of decoded step events for one connection.
pub type StepStream = BoxStream<'static, Result<StreamEvent, StreamError>>;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental decoder; chunks may split lines and UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.feed_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.data.is_empty() && self.event.is_none() {
                return None;
            }
            return Some(SseFrame {
                event: self.event.take(),
                data: std::mem::take(&mut self.data).join("\n"),
            });
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
            _ => {}
        }
        None
    }
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SseFrame {
    /// Map a frame onto a step event. Unknown event types yield `None`.
    pub fn into_event(self) -> Option<Result<StreamEvent, StreamError>> {
        match self.event.as_deref() {
            None | Some("step") | Some("message") => {
                if self.data.trim().is_empty() {
                    return None;
                }
                Some(
                    serde_json::from_str::<StepUpdate>(&self.data)
                        .map(StreamEvent::Step)
                        .map_err(StreamError::Malformed),
                )
            }
            Some("complete") | Some("done") => Some(Ok(StreamEvent::Complete)),
            Some("error") => {
                let message = serde_json::from_str::<RemoteError>(&self.data)
                    .ok()
                    .and_then(|e| e.message.or(e.error))
                    .unwrap_or(self.data);
                Some(Ok(StreamEvent::Failed(message)))
            }
            Some(other) => {
                tracing::trace!(event = other, "Ignoring unknown stream event");
                None
            }
        }
    }
}

/// Decode an open `text/event-stream` response into step events.
pub fn step_events(response: reqwest::Response) -> StepStream {
    let mut decoder = SseDecoder::default();
    response
        .bytes_stream()
        .map(move |chunk| match chunk {
            Ok(bytes) => decoder
                .push(&bytes)
                .into_iter()
                .filter_map(SseFrame::into_event)
                .collect::<Vec<_>>(),
            Err(e) => vec![Err(StreamError::Transport(e))],
        })
        .flat_map(stream::iter)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: step\r\nda").is_empty());
        assert!(decoder.push(b"ta: {\"step\":\"manifest_located\"}\r\n").is_empty());
        let frames = decoder.push(b"\r\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("step".to_string()),
                data: "{\"step\":\"manifest_located\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_comments_and_multiline_data() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(b": keep-alive\n\ndata: line one\ndata: line two\nid: 7\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, None);
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn test_frame_to_event() {
        let step = SseFrame {
            event: None,
            data: r#"{"step":"signature_checked","timestamp":"2024-05-01T12:00:00Z","payload":{"valid":true}}"#
                .to_string(),
        };
        match step.into_event() {
            Some(Ok(StreamEvent::Step(update))) => {
                assert_eq!(update.step, "signature_checked");
                assert_eq!(update.payload["valid"], true);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let complete = SseFrame {
            event: Some("complete".to_string()),
            data: String::new(),
        };
        assert!(matches!(complete.into_event(), Some(Ok(StreamEvent::Complete))));

        let error = SseFrame {
            event: Some("error".to_string()),
            data: r#"{"message":"manifest parser crashed"}"#.to_string(),
        };
        assert!(matches!(
            error.into_event(),
            Some(Ok(StreamEvent::Failed(message))) if message == "manifest parser crashed"
        ));

        let heartbeat = SseFrame {
            event: Some("ping".to_string()),
            data: String::new(),
        };
        assert!(heartbeat.into_event().is_none());
    }

    #[test]
    fn test_malformed_step_is_reported() {
        let frame = SseFrame {
            event: Some("step".to_string()),
            data: "not json".to_string(),
        };
        assert!(matches!(frame.into_event(), Some(Err(StreamError::Malformed(_)))));
    }
}
