use coursechat_history::Message;

use super::feedback::GradeReport;
use super::render::{CodeBlockInfo, RenderedContent};

/// Display side of a chat session; everything the controller draws goes through here.
///
/// Methods take `&self` so a surface can be shared with fire-and-forget tasks. Messages
/// are addressed by transcript position; `Message::index` is the reply number shown for
/// reporting.
pub trait ChatSurface: Send + Sync {
    fn append_message(&self, position: usize, message: &Message, content: &RenderedContent);
    fn update_message(&self, position: usize, content: &RenderedContent);
    fn set_input_enabled(&self, enabled: bool);
    fn attach_code_block_actions(&self, position: usize, code_blocks: &[CodeBlockInfo]);
    fn show_alert(&self, text: &str);
    fn show_grade(&self, grade: &GradeReport);

    /// Hidden surfaces skip refreshes for calls that complete in the background.
    fn is_visible(&self) -> bool {
        true
    }
}
