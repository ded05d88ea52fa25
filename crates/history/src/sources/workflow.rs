use std::collections::HashSet;

use serde_json::{Map, Value};

use super::{BoxFuture, HistoryQuery, HistorySource, non_blank, timestamp_millis};
use crate::client::BackendClient;
use crate::error::{HistoryResult, MalformedRecordSnafu};
use crate::types::{HistorySourceKind, Message, Role};

const KIND: HistorySourceKind = HistorySourceKind::Workflow;

/// Structured state of a guided exercise, keyed by user-block id.
#[derive(Debug, Clone)]
pub struct WorkflowSource {
    client: BackendClient,
    path: String,
}

impl WorkflowSource {
    pub fn new(client: BackendClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl HistorySource for WorkflowSource {
    fn kind(&self) -> HistorySourceKind {
        KIND
    }

    fn load<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, HistoryResult<Vec<Message>>> {
        Box::pin(async move {
            let payload = self
                .client
                .get_history_json(KIND, &self.path, &[("ub_id", query.ub_id.as_str())])
                .await?;
            parse_workflow_state(&payload)
        })
    }
}

/// Flattens workflow answer records into chat messages.
///
/// Records are put oldest-first before flattening (only when every one has a
/// `created_at`), so a repeated `assignment` is kept at its earliest occurrence. Fields
/// are read in a fixed order per answer. `assignment` stands in for a missing
/// `tutor_response` and is shown once per distinct prompt.
pub fn parse_workflow_state(payload: &Value) -> HistoryResult<Vec<Message>> {
    let answers = match payload {
        Value::Array(answers) => answers,
        Value::Object(state) => match state.get("answers") {
            Some(Value::Array(answers)) => answers,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => {
                return MalformedRecordSnafu {
                    stage: "parse-workflow-answers",
                    kind: KIND,
                    details: "`answers` is not a list".to_string(),
                }
                .fail();
            }
        },
        Value::Null => return Ok(Vec::new()),
        _ => {
            return MalformedRecordSnafu {
                stage: "parse-workflow-state",
                kind: KIND,
                details: "workflow state is neither a list nor an object".to_string(),
            }
            .fail();
        }
    };

    let mut records = answers
        .iter()
        .enumerate()
        .filter_map(|(position, answer)| match answer {
            Value::Object(fields) => Some(fields),
            _ => {
                tracing::warn!(position, "skipping workflow answer that is not an object");
                None
            }
        })
        .collect::<Vec<_>>();
    if records.iter().all(|fields| created_at(fields).is_some()) {
        records.sort_by_key(|fields| created_at(fields));
    }

    let mut seen_assignments = HashSet::new();
    let mut messages = Vec::new();
    for fields in records {
        flatten_answer(fields, &mut seen_assignments, &mut messages);
    }

    Ok(messages)
}

fn created_at(fields: &Map<String, Value>) -> Option<u64> {
    timestamp_millis(fields.get("created_at"), 1)
}

fn flatten_answer(
    fields: &Map<String, Value>,
    seen_assignments: &mut HashSet<String>,
    messages: &mut Vec<Message>,
) {
    let created_at = created_at(fields);
    let mut push = |role: Role, text: String| {
        messages.push(Message::new(role, text).with_timestamp(created_at));
    };

    if let Some(text) = string_field(fields, "user_message") {
        push(Role::User, text);
    }
    if let Some(text) = string_field(fields, "interviewer_question") {
        push(Role::Assistant, text);
    }
    match string_field(fields, "tutor_response") {
        Some(text) => push(Role::Assistant, text),
        None => {
            if let Some(text) = string_field(fields, "assignment")
                && seen_assignments.insert(text.clone())
            {
                push(Role::Assistant, text);
            }
        }
    }
    for key in ["coach_response", "assistant_response", "agent_response"] {
        if let Some(text) = string_field(fields, key) {
            push(Role::Assistant, text);
        }
    }
    if let Some(text) = string_field(fields, "answer") {
        push(Role::User, text);
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).and_then(non_blank)
}
