#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use coursechat::chat::{ChatSession, ChatSurface, CodeBlockInfo, GradeReport, RenderedContent};
use coursechat_history::{
    BlockId, CourseId, HistorySourceKind, LessonId, Message, Role, SessionStatus, UbId, UserId,
};
use coursechat_stream::{
    GenerationBackend, GenerationRequest, GenerationStreamHandle, IngestEvent, StreamFraming,
    make_event_stream,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Append {
        position: usize,
        role: Role,
        index: Option<usize>,
        text: String,
    },
    Update {
        position: usize,
        content: RenderedContent,
    },
    Input(bool),
    CodeBlocks {
        position: usize,
        count: usize,
    },
    Alert(String),
    Grade(GradeReport),
}

pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    visible: AtomicBool,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            visible: AtomicBool::new(true),
        })
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Source text of every update sent to the message at `position`, in order.
    pub fn updates_for(&self, position: usize) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Update { position: at, content } if at == position => {
                    Some(content.source_text().to_string())
                }
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Alert(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ChatSurface for RecordingSurface {
    fn append_message(&self, position: usize, message: &Message, content: &RenderedContent) {
        self.record(SurfaceCall::Append {
            position,
            role: message.role,
            index: message.index,
            text: content.source_text().to_string(),
        });
    }

    fn update_message(&self, position: usize, content: &RenderedContent) {
        self.record(SurfaceCall::Update {
            position,
            content: content.clone(),
        });
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.record(SurfaceCall::Input(enabled));
    }

    fn attach_code_block_actions(&self, position: usize, code_blocks: &[CodeBlockInfo]) {
        self.record(SurfaceCall::CodeBlocks {
            position,
            count: code_blocks.len(),
        });
    }

    fn show_alert(&self, text: &str) {
        self.record(SurfaceCall::Alert(text.to_string()));
    }

    fn show_grade(&self, grade: &GradeReport) {
        self.record(SurfaceCall::Grade(grade.clone()));
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

/// Generation backend that replays one scripted event list per call.
///
/// The channel closes after the last scripted event, so a script without a terminal
/// event looks like a dropped connection.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<IngestEvent>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Vec<IngestEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn framing(&self) -> StreamFraming {
        StreamFraming::Raw
    }

    fn open_stream(&self, request: GenerationRequest) -> GenerationStreamHandle {
        self.requests.lock().unwrap().push(request);
        let events = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let (event_tx, stream, cancel_rx) = make_event_stream();

        let worker = Box::pin(async move {
            let _cancel_rx = cancel_rx;
            for event in events {
                if event_tx.send(event).is_err() {
                    return;
                }
            }
        });

        GenerationStreamHandle { stream, worker }
    }
}

pub fn chat_session(status: SessionStatus) -> ChatSession {
    ChatSession {
        user_id: UserId::new("u-1"),
        block_id: BlockId::new("b-1"),
        ub_id: UbId::new("ub-7"),
        course_id: CourseId::new("course-3"),
        lesson_id: LessonId::new("lesson-5"),
        thread_id: None,
        status,
        history_source: HistorySourceKind::None,
    }
}
