//! # SSE frame source
//!
//! Turns the chunked body of a streaming completion response into a
//! [`FrameStream`]. Handles:
//! - Line buffering across chunk boundaries (`\n`, optional `\r`)
//! - `data:` payload extraction; comments, blank lines and other fields are dropped
//! - The `[DONE]` termination literal
//! - Per-payload JSON decoding, where failures become [`SourceItem::Malformed`]
//! - Transport errors, surfaced once as [`StreamError::Transport`]
//! - Bodies cut inside a line, surfaced as [`StreamError::StreamInterrupted`]
//!   unless [`SseParserOptions::process_remaining_buffer`] is set

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use skein_core::{CompletionFrame, StreamError};
use tracing::warn;

use crate::source::{FrameStream, SourceItem};

const DONE_MARKER: &str = "[DONE]";

/// Options for the SSE parser.
#[derive(Clone, Debug)]
pub struct SseParserOptions {
    /// Whether to decode an unterminated final line after the body ends.
    ///
    /// When `false`, a final payload line without a newline is reported as
    /// [`StreamError::StreamInterrupted`]. A bare `[DONE]` is accepted either way.
    pub process_remaining_buffer: bool,
}

impl Default for SseParserOptions {
    fn default() -> Self {
        Self {
            process_remaining_buffer: true,
        }
    }
}

/// Decode one `data:` payload into a frame.
pub fn decode_frame(data: &str) -> Result<CompletionFrame, serde_json::Error> {
    serde_json::from_str(data)
}

/// Parse an SSE byte stream into a [`FrameStream`].
///
/// The returned stream ends after the first `[DONE]`, after the body ends,
/// or after yielding a single transport error.
pub fn frame_stream<S, E>(byte_stream: S, options: &SseParserOptions) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let process_remaining = options.process_remaining_buffer;

    Box::pin(futures::stream::unfold(
        (Box::pin(byte_stream), BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line = buffer.split_to(newline_pos + 1);
                    line.truncate(newline_pos);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    if let Some(item) = classify_line(&line) {
                        let finished = item == SourceItem::Done;
                        return Some((Ok(item), (stream, buffer, finished)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "SSE stream read error");
                        let err = StreamError::Transport(e.to_string());
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => {
                        let rest = buffer.split();
                        return match classify_line(&rest) {
                            Some(item) if process_remaining || item == SourceItem::Done => {
                                Some((Ok(item), (stream, buffer, true)))
                            }
                            Some(_) => {
                                warn!(bytes = rest.len(), "SSE body ended inside a line");
                                let err = StreamError::StreamInterrupted(format!(
                                    "body ended inside an unterminated line of {} bytes",
                                    rest.len()
                                ));
                                Some((Err(err), (stream, buffer, true)))
                            }
                            None => None,
                        };
                    }
                }
            }
        },
    ))
}

/// Map one raw line to a source item; `None` for lines that carry no payload.
fn classify_line(line: &[u8]) -> Option<SourceItem> {
    let Ok(line) = std::str::from_utf8(line) else {
        return Some(SourceItem::Malformed {
            reason: "line is not valid UTF-8".to_string(),
        });
    };
    let data = extract_sse_data(line)?;
    if data == DONE_MARKER {
        return Some(SourceItem::Done);
    }
    Some(match decode_frame(data) {
        Ok(frame) => SourceItem::Frame(frame),
        Err(e) => SourceItem::Malformed {
            reason: e.to_string(),
        },
    })
}

/// Extract the payload of a `data:` line.
///
/// Returns `None` for comments, empty lines, other fields and empty payloads.
fn extract_sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed.strip_prefix("data:")?.trim();
    (!data.is_empty()).then_some(data)
}
