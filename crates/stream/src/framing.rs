//! Chunk decoders for the two wire shapes served by generation endpoints.
//!
//! Raw bodies are plain UTF-8 text where every chunk extends the transcript. Event bodies
//! carry `data: <json>` lines whose `text` field is the whole transcript so far.

use serde::{Deserialize, Serialize};

use super::error::{InvalidUtf8Snafu, StreamResult, TruncatedUtf8Snafu};

/// Literal payload some backends send after the last event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Framing of a generation response, fixed per configured endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFraming {
    #[default]
    Raw,
    #[serde(alias = "sse", alias = "event-framed")]
    Event,
}

impl StreamFraming {
    pub fn decoder(self) -> FrameDecoder {
        match self {
            Self::Raw => FrameDecoder::Raw(RawTextDecoder::default()),
            Self::Event => FrameDecoder::Event(EventFrameDecoder::default()),
        }
    }
}

/// Incremental UTF-8 decoder that carries partial sequences across chunk boundaries.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn decode(&mut self, chunk: &[u8]) -> StreamResult<String> {
        self.pending.extend_from_slice(chunk);

        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(error) if error.error_len().is_none() => error.valid_up_to(),
            Err(error) => {
                return InvalidUtf8Snafu {
                    stage: "decode-chunk",
                    valid_up_to: error.valid_up_to(),
                }
                .fail();
            }
        };

        // The prefix was just validated, so the lossy conversion never substitutes.
        let text = String::from_utf8_lossy(&self.pending[..valid_up_to]).into_owned();
        self.pending.drain(..valid_up_to);
        Ok(text)
    }

    pub fn finish(&mut self) -> StreamResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        TruncatedUtf8Snafu {
            stage: "finish-body",
            pending_bytes: self.pending.len(),
        }
        .fail()
    }
}

/// Append-only transcript built from raw text chunks.
#[derive(Debug, Default)]
pub struct RawTextDecoder {
    utf8: Utf8Carry,
    transcript: String,
}

impl RawTextDecoder {
    /// Returns the grown transcript, or `None` when the chunk only held a partial character.
    pub fn push(&mut self, chunk: &[u8]) -> StreamResult<Option<&str>> {
        let text = self.utf8.decode(chunk)?;
        if text.is_empty() {
            return Ok(None);
        }
        self.transcript.push_str(&text);
        Ok(Some(&self.transcript))
    }

    pub fn finish(&mut self) -> StreamResult<String> {
        self.utf8.finish()?;
        Ok(self.transcript.clone())
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(default)]
    text: Option<String>,
}

/// Replace-semantics transcript built from `data:` event lines.
#[derive(Debug, Default)]
pub struct EventFrameDecoder {
    utf8: Utf8Carry,
    line_buffer: String,
    transcript: String,
}

impl EventFrameDecoder {
    /// Returns one transcript snapshot per complete record that carried `text`.
    ///
    /// A trailing line without a newline stays buffered until the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> StreamResult<Vec<String>> {
        let text = self.utf8.decode(chunk)?;
        self.line_buffer.push_str(&text);

        let Some(last_newline) = self.line_buffer.rfind('\n') else {
            return Ok(Vec::new());
        };

        let snapshots = self.line_buffer[..last_newline]
            .split('\n')
            .filter_map(parse_event_line)
            .collect::<Vec<_>>();
        self.line_buffer.drain(..=last_newline);

        if let Some(latest) = snapshots.last() {
            self.transcript.clone_from(latest);
        }
        Ok(snapshots)
    }

    pub fn finish(&mut self) -> StreamResult<String> {
        self.utf8.finish()?;
        if !self.line_buffer.trim().is_empty() {
            tracing::debug!(
                pending_len = self.line_buffer.len(),
                "discarding unterminated event line at end of body"
            );
        }
        self.line_buffer.clear();
        Ok(self.transcript.clone())
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

fn parse_event_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix("data:")?.trim();

    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        tracing::debug!("received stream done sentinel");
        return None;
    }

    match serde_json::from_str::<EventRecord>(payload) {
        Ok(record) => record.text,
        Err(error) => {
            tracing::warn!(
                error = %error,
                payload_len = payload.len(),
                "skipping malformed event record"
            );
            None
        }
    }
}

/// Decoder selected by [`StreamFraming`].
#[derive(Debug)]
pub enum FrameDecoder {
    Raw(RawTextDecoder),
    Event(EventFrameDecoder),
}

impl FrameDecoder {
    /// Feeds one chunk and returns the transcript snapshots it produced, in order.
    pub fn push(&mut self, chunk: &[u8]) -> StreamResult<Vec<String>> {
        match self {
            Self::Raw(decoder) => Ok(decoder
                .push(chunk)?
                .map(str::to_string)
                .into_iter()
                .collect()),
            Self::Event(decoder) => decoder.push(chunk),
        }
    }

    pub fn finish(&mut self) -> StreamResult<String> {
        match self {
            Self::Raw(decoder) => decoder.finish(),
            Self::Event(decoder) => decoder.finish(),
        }
    }

    /// Transcript as of the last decoded chunk.
    pub fn transcript(&self) -> &str {
        match self {
            Self::Raw(decoder) => decoder.transcript(),
            Self::Event(decoder) => decoder.transcript(),
        }
    }
}
