use snafu::Snafu;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StreamError {
    #[snafu(display("failed to build generation http client: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("generation request failed on `{stage}`: {source}"))]
    OpenRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("generation endpoint returned status {status}: {body}"))]
    OpenStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to read response chunk on `{stage}`: {source}"))]
    ReadChunk { stage: &'static str, source: BoxError },
    #[snafu(display("response body is not valid UTF-8 after byte {valid_up_to}"))]
    InvalidUtf8 {
        stage: &'static str,
        valid_up_to: usize,
    },
    #[snafu(display("response body ended inside a {pending_bytes}-byte UTF-8 sequence"))]
    TruncatedUtf8 {
        stage: &'static str,
        pending_bytes: usize,
    },
}

pub type StreamResult<T> = Result<T, StreamError>;
