use serde_json::Value;

use super::{
    BoxFuture, HistoryQuery, HistorySource, into_chronological, non_blank, timestamp_millis,
};
use crate::client::BackendClient;
use crate::error::{HistoryResult, MalformedRecordSnafu};
use crate::types::{HistorySourceKind, Message};

const KIND: HistorySourceKind = HistorySourceKind::LegacyRecord;

/// Older one-row-per-turn exchange records with loosely typed content.
#[derive(Debug, Clone)]
pub struct LegacyRecordSource {
    client: BackendClient,
    path: String,
}

impl LegacyRecordSource {
    pub fn new(client: BackendClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl HistorySource for LegacyRecordSource {
    fn kind(&self) -> HistorySourceKind {
        KIND
    }

    fn load<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, HistoryResult<Vec<Message>>> {
        Box::pin(async move {
            let payload = self
                .client
                .get_history_json(KIND, &self.path, &[("ub_id", query.ub_id.as_str())])
                .await?;
            parse_legacy_records(&payload)
        })
    }
}

/// Decodes legacy exchange rows into a user message followed by its assistant replies.
pub fn parse_legacy_records(payload: &Value) -> HistoryResult<Vec<Message>> {
    let records = match payload {
        Value::Array(records) => records,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return MalformedRecordSnafu {
                stage: "parse-legacy-records",
                kind: KIND,
                details: "legacy record payload is not a list".to_string(),
            }
            .fail();
        }
    };

    let mut messages = Vec::new();
    for (position, record) in records.iter().enumerate() {
        let Value::Object(fields) = record else {
            tracing::warn!(position, "skipping legacy record that is not an object");
            continue;
        };
        let created_at = timestamp_millis(fields.get("created_at"), 1);

        if let Some(text) = fields.get("user_content").and_then(decode_user_content) {
            messages.push(Message::user(text).with_timestamp(created_at));
        }
        if let Some(ai_content) = fields.get("ai_content") {
            for text in decode_ai_content(ai_content) {
                messages.push(Message::assistant(text).with_timestamp(created_at));
            }
        }
    }

    Ok(into_chronological(messages))
}

fn decode_user_content(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => fields
                .get("text")
                .and_then(Value::as_str)
                .and_then(non_blank)
                .or_else(|| non_blank(raw)),
            Ok(Value::String(inner)) => non_blank(&inner),
            Ok(_) | Err(_) => non_blank(raw),
        },
        Value::Object(fields) => fields.get("text").and_then(Value::as_str).and_then(non_blank),
        Value::Null => None,
        other => {
            tracing::warn!(kind = %KIND, value = %other, "unexpected user_content type");
            None
        }
    }
}

fn decode_ai_content(value: &Value) -> Vec<String> {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => item_texts(&items),
            Ok(Value::Object(fields)) => fields
                .get("text")
                .and_then(Value::as_str)
                .and_then(non_blank)
                .into_iter()
                .collect(),
            Ok(Value::String(inner)) => non_blank(&inner).into_iter().collect(),
            Ok(_) | Err(_) => non_blank(raw).into_iter().collect(),
        },
        Value::Array(items) => item_texts(items),
        Value::Object(fields) => fields
            .get("text")
            .and_then(Value::as_str)
            .and_then(non_blank)
            .into_iter()
            .collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(kind = %KIND, value = %other, "unexpected ai_content type");
            Vec::new()
        }
    }
}

fn item_texts(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(fields) => fields.get("text").and_then(Value::as_str),
            Value::String(text) => Some(text.as_str()),
            _ => None,
        })
        .filter_map(non_blank)
        .collect()
}
