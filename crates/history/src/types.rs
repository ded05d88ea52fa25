use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{BlockId, CourseId, LessonId, ThreadId, UbId, UserId};

/// Chat speaker role as stored by every history backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Maps a backend role string; anything that is not `user` renders as assistant.
    pub fn from_wire(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

/// One displayable chat message.
///
/// `index` numbers assistant messages only, in creation order, so a reply can be
/// referenced when reporting it. User messages carry `None`. It is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub created_at_unix_millis: Option<u64>,
    pub index: Option<usize>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at_unix_millis: None,
            index: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn with_timestamp(mut self, created_at_unix_millis: Option<u64>) -> Self {
        self.created_at_unix_millis = created_at_unix_millis;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Numbers assistant messages from zero in slice order; user messages get no index.
pub fn assign_reply_indices(messages: &mut [Message]) {
    let mut next = 0;
    for message in messages {
        message.index = match message.role {
            Role::Assistant => {
                next += 1;
                Some(next - 1)
            }
            Role::User => None,
        };
    }
}

/// Backend that produced a resolved history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HistorySourceKind {
    Workflow,
    LegacyRecord,
    ThreadApi,
    #[default]
    None,
}

impl fmt::Display for HistorySourceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Workflow => "workflow",
            Self::LegacyRecord => "legacy-record",
            Self::ThreadApi => "thread-api",
            Self::None => "none",
        };
        formatter.write_str(label)
    }
}

/// Outcome of one history resolution; `source` is `None` when nothing was found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedHistory {
    pub source: HistorySourceKind,
    pub messages: Vec<Message>,
}

impl ResolvedHistory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Progress status of a user-block; changed only by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Started,
    Finished,
    Blocked,
}

impl SessionStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "started" => Self::Started,
            "finished" => Self::Finished,
            "blocked" => Self::Blocked,
            _ => Self::Idle,
        }
    }

    /// Whether the student may still send messages in this block.
    pub fn accepts_input(self) -> bool {
        matches!(self, Self::Idle | Self::Started)
    }
}

/// Join of student, block, lesson and course that anchors one chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBlock {
    pub ub_id: UbId,
    pub user_id: UserId,
    pub block_id: BlockId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub status: SessionStatus,
    pub thread_id: Option<ThreadId>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn only_assistant_messages_are_numbered() {
        let mut messages = vec![
            Message::assistant("Ready?").with_index(9),
            Message::user("Yes").with_index(4),
            Message::assistant("Great"),
        ];
        assign_reply_indices(&mut messages);

        assert_eq!(
            messages.iter().map(|message| message.index).collect::<Vec<_>>(),
            vec![Some(0), None, Some(1)]
        );
    }
}
