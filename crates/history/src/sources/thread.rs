use serde_json::Value;
use snafu::{OptionExt, ResultExt};

use super::{BoxFuture, HistoryQuery, HistorySource, into_chronological, timestamp_millis};
use crate::client::join_url;
use crate::error::{
    HistoryResult, MalformedRecordSnafu, MissingThreadIdSnafu, SourceRequestSnafu,
    SourceStatusSnafu,
};
use crate::ids::ThreadId;
use crate::normalize::normalize;
use crate::types::{HistorySourceKind, Message, Role};

const KIND: HistorySourceKind = HistorySourceKind::ThreadApi;

/// Externally hosted thread transcript (OpenAI-compatible `threads/{id}/messages`).
#[derive(Debug, Clone)]
pub struct ThreadTranscriptSource {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ThreadTranscriptSource {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
        }
    }

    async fn fetch(&self, thread_id: &ThreadId) -> HistoryResult<Value> {
        let url = join_url(&self.base_url, &format!("threads/{thread_id}/messages"));
        let mut request = self.http.get(url).header("OpenAI-Beta", "assistants=v2");
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.context(SourceRequestSnafu {
            stage: "send-thread-request",
            kind: KIND,
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SourceStatusSnafu {
                stage: "thread-http-status",
                kind: KIND,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        response.json::<Value>().await.context(SourceRequestSnafu {
            stage: "decode-thread-body",
            kind: KIND,
        })
    }
}

impl HistorySource for ThreadTranscriptSource {
    fn kind(&self) -> HistorySourceKind {
        KIND
    }

    fn load<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, HistoryResult<Vec<Message>>> {
        Box::pin(async move {
            let thread_id = query.thread_id.as_ref().context(MissingThreadIdSnafu {
                stage: "thread-source-load",
            })?;
            let payload = self.fetch(thread_id).await?;
            parse_thread_messages(&payload)
        })
    }
}

/// Parses a newest-first thread listing into oldest-first messages.
///
/// Only the first content block of each message is read, and its text is passed through
/// the legacy normalizer because older turns were stored as serialized objects.
pub fn parse_thread_messages(payload: &Value) -> HistoryResult<Vec<Message>> {
    let Some(Value::Array(entries)) = payload.get("data") else {
        return MalformedRecordSnafu {
            stage: "parse-thread-listing",
            kind: KIND,
            details: "thread listing has no `data` list".to_string(),
        }
        .fail();
    };

    let messages = entries
        .iter()
        .rev()
        .filter_map(|entry| {
            let role = Role::from_wire(entry.get("role").and_then(Value::as_str).unwrap_or(""));
            let Some(raw) = entry.pointer("/content/0/text/value").and_then(Value::as_str) else {
                tracing::warn!(kind = %KIND, "skipping thread message without text content");
                return None;
            };
            let text = normalize(raw, role);
            if text.trim().is_empty() {
                return None;
            }
            let created_at = timestamp_millis(entry.get("created_at"), 1000);
            Some(Message::new(role, text).with_timestamp(created_at))
        })
        .collect::<Vec<_>>();

    Ok(into_chronological(messages))
}
