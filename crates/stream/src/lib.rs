mod error;
mod framing;
mod generation;
mod ingest;

pub use error::{BoxError, StreamError, StreamResult};
pub use framing::{
    DONE_SENTINEL, EventFrameDecoder, FrameDecoder, RawTextDecoder, StreamFraming, Utf8Carry,
};
pub use generation::{
    GenerationBackend, GenerationRequest, GenerationStreamHandle, GenerationWorker,
    HttpGenerationClient, IngestEventStream, make_event_stream,
};
pub use ingest::{IngestEvent, StreamFailure, ingest};
