use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::error::HistoryResult;
use super::ids::{ThreadId, UbId};
use super::types::{HistorySourceKind, Message};

mod legacy;
mod thread;
mod workflow;

pub use legacy::{LegacyRecordSource, parse_legacy_records};
pub use thread::{ThreadTranscriptSource, parse_thread_messages};
pub use workflow::{WorkflowSource, parse_workflow_state};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Keys identifying the conversation whose history is being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub ub_id: UbId,
    pub thread_id: Option<ThreadId>,
}

impl HistoryQuery {
    pub fn new(ub_id: UbId, thread_id: Option<ThreadId>) -> Self {
        Self { ub_id, thread_id }
    }
}

/// One backend that may hold a conversation's history.
///
/// Implementations fetch and parse; an `Ok` with an empty list means "nothing here".
pub trait HistorySource: Send + Sync {
    fn kind(&self) -> HistorySourceKind;
    fn load<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, HistoryResult<Vec<Message>>>;
}

/// Reads a backend timestamp (number or numeric string) scaled to unix millis.
pub(crate) fn timestamp_millis(value: Option<&Value>, millis_per_unit: u64) -> Option<u64> {
    let raw = match value? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))?,
        Value::String(text) => text.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    raw.checked_mul(millis_per_unit)
}

/// Orders messages oldest-first when every one of them carries a timestamp.
///
/// The sort is stable so messages flattened from one record keep their relative order.
pub(crate) fn into_chronological(mut messages: Vec<Message>) -> Vec<Message> {
    if messages
        .iter()
        .all(|message| message.created_at_unix_millis.is_some())
    {
        messages.sort_by_key(|message| message.created_at_unix_millis);
    }
    messages
}

pub(crate) fn non_blank(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
