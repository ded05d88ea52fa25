use coursechat_history::HistoryError;
use coursechat_stream::StreamError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("failed to look up the chat session on `{stage}`: {source}"))]
    LookupUserBlock {
        stage: &'static str,
        source: HistoryError,
    },
    #[snafu(display("failed to build backend client on `{stage}`: {source}"))]
    BuildBackend {
        stage: &'static str,
        source: HistoryError,
    },
    #[snafu(display("failed to build generation client on `{stage}`: {source}"))]
    BuildGeneration {
        stage: &'static str,
        source: StreamError,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{endpoint} request failed on `{stage}`: {source}"))]
    FeedbackRequest {
        stage: &'static str,
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{endpoint} endpoint returned status {status}: {body}"))]
    FeedbackStatus {
        stage: &'static str,
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("report and grading endpoints are not configured on `{stage}`"))]
    FeedbackUnavailable { stage: &'static str },
    #[snafu(display("no message with index {index} in this session"))]
    UnknownMessage { stage: &'static str, index: usize },
    #[snafu(display("missing {name}; pass it as an argument or set {env_var}"))]
    MissingIdentity {
        stage: &'static str,
        name: &'static str,
        env_var: &'static str,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
