pub mod client;
pub mod error;
pub mod ids;
pub mod normalize;
pub mod resolver;
pub mod sources;
pub mod types;

pub use client::BackendClient;
pub use error::{HistoryError, HistoryResult};
pub use ids::{BlockId, CourseId, LessonId, ThreadId, UbId, UserId};
pub use normalize::normalize;
pub use resolver::HistoryResolver;
pub use sources::{
    BoxFuture, HistoryQuery, HistorySource, LegacyRecordSource, ThreadTranscriptSource,
    WorkflowSource, parse_legacy_records, parse_thread_messages, parse_workflow_state,
};
pub use types::{
    HistorySourceKind, Message, ResolvedHistory, Role, SessionStatus, UserBlock,
    assign_reply_indices,
};
