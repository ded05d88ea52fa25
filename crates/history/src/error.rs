use snafu::Snafu;

use super::types::HistorySourceKind;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HistoryError {
    #[snafu(display("history source {kind} unavailable on `{stage}`: {source}"))]
    SourceRequest {
        stage: &'static str,
        kind: HistorySourceKind,
        source: reqwest::Error,
    },
    #[snafu(display("history source {kind} returned status {status} on `{stage}`: {body}"))]
    SourceStatus {
        stage: &'static str,
        kind: HistorySourceKind,
        status: u16,
        body: String,
    },
    #[snafu(display("history source {kind} sent a malformed payload on `{stage}`: {details}"))]
    MalformedRecord {
        stage: &'static str,
        kind: HistorySourceKind,
        details: String,
    },
    #[snafu(display("thread transcript requested without a thread id"))]
    MissingThreadId { stage: &'static str },
    #[snafu(display("no user-block found for user '{user_id}' and block '{block_id}'"))]
    UserBlockNotFound {
        stage: &'static str,
        user_id: String,
        block_id: String,
    },
    #[snafu(display("user-block lookup failed on `{stage}`: {source}"))]
    UserBlockRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("user-block lookup returned status {status}: {body}"))]
    UserBlockStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to build backend http client: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
}

impl HistoryError {
    /// True for transport and status failures of one history source.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceRequest { .. } | Self::SourceStatus { .. })
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
