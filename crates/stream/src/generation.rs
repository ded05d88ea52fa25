use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};

use super::error::{
    BuildHttpClientSnafu, OpenRequestSnafu, OpenStatusSnafu, StreamError, StreamResult,
};
use super::framing::StreamFraming;
use super::ingest::{IngestEvent, StreamFailure, ingest};

/// Body of one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub session_id: String,
    pub content: String,
}

impl GenerationRequest {
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            content: content.into(),
        }
    }
}

pub type GenerationWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Receiving half of one generation stream.
///
/// Dropping it signals the worker to abandon the in-flight read.
pub struct IngestEventStream {
    events: mpsc::UnboundedReceiver<IngestEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl IngestEventStream {
    pub fn new(
        events: mpsc::UnboundedReceiver<IngestEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<IngestEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<IngestEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for IngestEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Event stream plus the future that feeds it; the caller decides where the worker runs.
pub struct GenerationStreamHandle {
    pub stream: IngestEventStream,
    pub worker: GenerationWorker,
}

pub trait GenerationBackend: Send + Sync {
    fn framing(&self) -> StreamFraming;
    fn open_stream(&self, request: GenerationRequest) -> GenerationStreamHandle;
}

pub fn make_event_stream() -> (
    mpsc::UnboundedSender<IngestEvent>,
    IngestEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        IngestEventStream::new(event_rx, cancel_tx),
        cancel_rx,
    )
}

/// POSTs to the configured generation endpoint and ingests its chunked response.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    http: reqwest::Client,
    url: String,
    framing: StreamFraming,
}

impl HttpGenerationClient {
    pub fn new(url: impl Into<String>, framing: StreamFraming) -> StreamResult<Self> {
        // No overall timeout: a reply may legitimately stream for minutes.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context(BuildHttpClientSnafu {
                stage: "generation-client-new",
            })?;
        Ok(Self::with_http(http, url, framing))
    }

    pub fn with_http(
        http: reqwest::Client,
        url: impl Into<String>,
        framing: StreamFraming,
    ) -> Self {
        Self {
            http,
            url: url.into().trim().to_string(),
            framing,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(
        http: &reqwest::Client,
        url: &str,
        request: &GenerationRequest,
    ) -> StreamResult<reqwest::Response> {
        let response = http
            .post(url)
            .json(request)
            .send()
            .await
            .context(OpenRequestSnafu {
                stage: "send-generation-request",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return OpenStatusSnafu {
                stage: "generation-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        Ok(response)
    }

    async fn run_stream_worker(
        http: reqwest::Client,
        url: String,
        framing: StreamFraming,
        request: GenerationRequest,
        event_tx: mpsc::UnboundedSender<IngestEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let response = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(session_id = %request.session_id, "generation abandoned before open");
                return;
            }
            result = Self::send(&http, &url, &request) => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    session_id = %request.session_id,
                    url = %url,
                    error = %error,
                    "failed to open generation stream"
                );
                Self::emit_failure(&event_tx, &error);
                return;
            }
        };

        if event_tx.send(IngestEvent::Opened).is_err() {
            return;
        }

        let events = ingest(response.bytes_stream(), framing);
        futures::pin_mut!(events);

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    tracing::debug!(session_id = %request.session_id, "generation stream abandoned");
                    break;
                }
                next = events.next() => {
                    let Some(event) = next else {
                        break;
                    };
                    let terminal = event.is_terminal();
                    if event_tx.send(event).is_err() || terminal {
                        break;
                    }
                }
            }
        }
    }

    fn emit_failure(event_tx: &mpsc::UnboundedSender<IngestEvent>, error: &StreamError) {
        let _ = event_tx.send(IngestEvent::Failed {
            failure: StreamFailure::open(error),
            accumulated: String::new(),
        });
    }
}

impl GenerationBackend for HttpGenerationClient {
    fn framing(&self) -> StreamFraming {
        self.framing
    }

    fn open_stream(&self, request: GenerationRequest) -> GenerationStreamHandle {
        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: GenerationWorker = Box::pin(Self::run_stream_worker(
            self.http.clone(),
            self.url.clone(),
            self.framing,
            request,
            event_tx,
            cancel_rx,
        ));

        GenerationStreamHandle { stream, worker }
    }
}
