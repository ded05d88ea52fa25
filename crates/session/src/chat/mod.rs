pub mod controller;
pub mod feedback;
pub mod message;
pub mod render;
pub mod surface;

pub use controller::{
    ChatSession, GRADING_FAILED_ALERT, REPORT_FAILED_ALERT, SessionController, SubmitOutcome,
    SubmitRejection,
};
pub use feedback::{FeedbackClient, GradeReport, MessageReport};
pub use message::{TransitionRejection, TurnId, TurnPhase, TurnTransition};
pub use render::{
    CodeBlockInfo, MarkdownHtmlRenderer, MarkdownRenderer, RenderError, RenderedContent,
    code_blocks,
};
pub use surface::ChatSurface;
