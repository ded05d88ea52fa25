use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};

use super::error::{BoxError, StreamError};
use super::framing::{FrameDecoder, StreamFraming};

/// Why a generation stream stopped before completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// The request failed before any body byte arrived.
    Open { message: String },
    /// The body failed mid-stream.
    Read { message: String },
}

impl StreamFailure {
    pub fn open(error: &StreamError) -> Self {
        Self::Open {
            message: error.to_string(),
        }
    }

    pub fn read(error: &StreamError) -> Self {
        Self::Read {
            message: error.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Open { message } | Self::Read { message } => message,
        }
    }
}

/// One step of a generation stream as seen by the session controller.
///
/// `TextUpdate` and `Done` always carry the full transcript, never a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Opened,
    TextUpdate(String),
    Done(String),
    Failed {
        failure: StreamFailure,
        accumulated: String,
    },
}

impl IngestEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed { .. })
    }
}

struct IngestState<S> {
    body: Pin<Box<S>>,
    decoder: FrameDecoder,
    ready: VecDeque<IngestEvent>,
    finished: bool,
}

/// Turns a chunked response body into transcript updates ending in `Done` or `Failed`.
///
/// Chunks are decoded strictly in arrival order; the decoder's carry-over state for split
/// characters and split lines depends on it.
pub fn ingest<S, E>(body: S, framing: StreamFraming) -> impl Stream<Item = IngestEvent>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let state = IngestState {
        body: Box::pin(body),
        decoder: framing.decoder(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(snapshots) => state
                        .ready
                        .extend(snapshots.into_iter().map(IngestEvent::TextUpdate)),
                    Err(error) => state.fail(&error),
                },
                Some(Err(source)) => {
                    let error = StreamError::ReadChunk {
                        stage: "read-body-chunk",
                        source: source.into(),
                    };
                    state.fail(&error);
                }
                None => {
                    state.finished = true;
                    match state.decoder.finish() {
                        Ok(transcript) => state.ready.push_back(IngestEvent::Done(transcript)),
                        Err(error) => state.fail(&error),
                    }
                }
            }
        }
    })
}

impl<S> IngestState<S> {
    fn fail(&mut self, error: &StreamError) {
        tracing::warn!(error = %error, "generation stream read failed");
        self.finished = true;
        self.ready.push_back(IngestEvent::Failed {
            failure: StreamFailure::read(error),
            accumulated: self.decoder.transcript().to_string(),
        });
    }
}
