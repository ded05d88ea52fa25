use std::sync::Arc;

use coursechat_history::{
    BlockId, CourseId, HistorySourceKind, LessonId, Message, ResolvedHistory, Role,
    SessionStatus, ThreadId, UbId, UserBlock, UserId, assign_reply_indices,
};
use coursechat_stream::{
    GenerationBackend, GenerationRequest, IngestEvent, IngestEventStream, StreamFailure,
};
use snafu::OptionExt;
use tokio::task::JoinHandle;

use super::feedback::{FeedbackClient, MessageReport};
use super::message::{TurnId, TurnPhase, TurnTransition};
use super::render::{MarkdownRenderer, RenderedContent, code_blocks};
use super::surface::ChatSurface;
use crate::error::{FeedbackUnavailableSnafu, SessionResult, UnknownMessageSnafu};
use crate::settings::state::DEFAULT_STREAM_ERROR_MESSAGE;

pub const REPORT_FAILED_ALERT: &str = "We could not send your report. Please try again later.";
pub const GRADING_FAILED_ALERT: &str = "Grading is unavailable right now.";
const STREAM_CLOSED_EARLY: &str = "generation stream closed before a terminal event";

/// Immutable anchor of one page session, built from the user-block lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub user_id: UserId,
    pub block_id: BlockId,
    pub ub_id: UbId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub thread_id: Option<ThreadId>,
    pub status: SessionStatus,
    pub history_source: HistorySourceKind,
}

impl ChatSession {
    pub fn from_user_block(block: UserBlock) -> Self {
        Self {
            user_id: block.user_id,
            block_id: block.block_id,
            ub_id: block.ub_id,
            course_id: block.course_id,
            lesson_id: block.lesson_id,
            thread_id: block.thread_id,
            status: block.status,
            history_source: HistorySourceKind::None,
        }
    }
}

/// Why a submit did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyText,
    Busy(TurnPhase),
    InputClosed(SessionStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(TurnId),
    Ignored(SubmitRejection),
}

/// State of the single in-flight turn.
///
/// The assistant placeholder at `placeholder_position` belongs to this turn until it settles;
/// nothing else writes to it.
struct ActiveTurn {
    id: TurnId,
    accumulated_text: String,
    placeholder_position: usize,
    events: IngestEventStream,
}

/// Owns the transcript and drives one turn at a time through the phase machine.
pub struct SessionController {
    session: ChatSession,
    generation: Arc<dyn GenerationBackend>,
    surface: Arc<dyn ChatSurface>,
    renderer: Option<Arc<dyn MarkdownRenderer>>,
    feedback: Option<FeedbackClient>,
    stream_error_message: String,
    messages: Vec<Message>,
    phase: TurnPhase,
    active_turn: Option<ActiveTurn>,
}

impl SessionController {
    pub fn new(
        session: ChatSession,
        generation: Arc<dyn GenerationBackend>,
        surface: Arc<dyn ChatSurface>,
    ) -> Self {
        Self {
            session,
            generation,
            surface,
            renderer: None,
            feedback: None,
            stream_error_message: DEFAULT_STREAM_ERROR_MESSAGE.to_string(),
            messages: Vec::new(),
            phase: TurnPhase::Idle,
            active_turn: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackClient) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_stream_error_message(mut self, message: impl Into<String>) -> Self {
        self.stream_error_message = message.into();
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Replaces the transcript with a resolved history and renders it.
    ///
    /// Refused while a turn is in flight, since the placeholder belongs to that turn.
    pub fn load_history(&mut self, history: ResolvedHistory) -> bool {
        if !self.phase.is_idle() {
            tracing::warn!(
                ub_id = %self.session.ub_id,
                phase = ?self.phase,
                "ignoring history load during an active turn"
            );
            return false;
        }

        self.session.history_source = history.source;
        self.messages = history.messages;
        assign_reply_indices(&mut self.messages);
        for (position, message) in self.messages.iter().enumerate() {
            let content = self.render_message(message);
            self.surface.append_message(position, message, &content);
        }

        tracing::info!(
            ub_id = %self.session.ub_id,
            source = %self.session.history_source,
            message_count = self.messages.len(),
            "chat history loaded"
        );
        self.surface
            .set_input_enabled(self.session.status.accepts_input());
        true
    }

    /// Starts a turn: renders the user message, adds an empty assistant placeholder and
    /// opens the generation stream. Must be called inside a tokio runtime.
    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored(SubmitRejection::EmptyText);
        }
        if !self.phase.is_idle() {
            tracing::debug!(phase = ?self.phase, "submit ignored while a turn is active");
            return SubmitOutcome::Ignored(SubmitRejection::Busy(self.phase));
        }
        if !self.session.status.accepts_input() {
            return SubmitOutcome::Ignored(SubmitRejection::InputClosed(self.session.status));
        }

        let turn_id = TurnId::new_v7();
        if !self.transition(TurnTransition::Submit(turn_id)) {
            return SubmitOutcome::Ignored(SubmitRejection::Busy(self.phase));
        }
        self.surface.set_input_enabled(false);

        let user_position = self.push_message(Message::user(text));
        self.surface.append_message(
            user_position,
            &self.messages[user_position],
            &RenderedContent::Plain(text.to_string()),
        );
        let placeholder_position = self.push_message(Message::assistant(String::new()));
        self.surface.append_message(
            placeholder_position,
            &self.messages[placeholder_position],
            &RenderedContent::Plain(String::new()),
        );

        let handle = self
            .generation
            .open_stream(GenerationRequest::new(self.session.ub_id.as_str(), text));
        tokio::spawn(handle.worker);

        tracing::info!(
            ub_id = %self.session.ub_id,
            turn = %turn_id,
            framing = ?self.generation.framing(),
            "turn submitted"
        );
        self.active_turn = Some(ActiveTurn {
            id: turn_id,
            accumulated_text: String::new(),
            placeholder_position,
            events: handle.stream,
        });

        SubmitOutcome::Accepted(turn_id)
    }

    /// Consumes stream events until the active turn settles; returns the resulting phase.
    pub async fn drive_turn(&mut self) -> TurnPhase {
        loop {
            let Some(turn) = self.active_turn.as_mut() else {
                return self.phase;
            };
            let turn_id = turn.id;
            let event = turn.events.recv().await;

            match event {
                Some(event) => self.apply_event(turn_id, event),
                None => {
                    let accumulated = self
                        .active_turn
                        .as_ref()
                        .map(|turn| turn.accumulated_text.clone())
                        .unwrap_or_default();
                    self.apply_event(
                        turn_id,
                        IngestEvent::Failed {
                            failure: StreamFailure::Read {
                                message: STREAM_CLOSED_EARLY.to_string(),
                            },
                            accumulated,
                        },
                    );
                }
            }
        }
    }

    /// Applies one ingest event to the turn it belongs to; events for other turns are dropped.
    pub fn apply_event(&mut self, turn_id: TurnId, event: IngestEvent) {
        let Some(active) = self.active_turn.as_ref().map(|turn| turn.id) else {
            tracing::debug!(turn = %turn_id, "dropping event with no active turn");
            return;
        };
        if active != turn_id {
            tracing::debug!(turn = %turn_id, active = %active, "dropping stale turn event");
            return;
        }

        match event {
            IngestEvent::Opened => {
                self.transition(TurnTransition::Open(turn_id));
            }
            IngestEvent::TextUpdate(text) => {
                if matches!(self.phase, TurnPhase::Sending(_)) {
                    self.transition(TurnTransition::Open(turn_id));
                }
                if matches!(self.phase, TurnPhase::Streaming(_)) {
                    self.show_partial(text);
                }
            }
            IngestEvent::Done(text) => {
                if self.transition(TurnTransition::Finish(turn_id)) {
                    self.finalize(text);
                    self.transition(TurnTransition::Settle(turn_id));
                    self.finish_turn();
                }
            }
            IngestEvent::Failed {
                failure,
                accumulated,
            } => {
                if self.transition(TurnTransition::Fail(turn_id)) {
                    self.show_failure(&failure, &accumulated);
                    self.finish_turn();
                }
            }
        }
    }

    /// Sends a report about one assistant reply on a background task; failures raise an
    /// alert.
    ///
    /// `index` is the reply number, not the transcript position. The reply still being
    /// streamed cannot be reported.
    pub fn report_message(&self, index: usize, reason: &str) -> SessionResult<JoinHandle<()>> {
        let feedback = self.feedback.clone().context(FeedbackUnavailableSnafu {
            stage: "report-message",
        })?;
        let in_flight = self
            .active_turn
            .as_ref()
            .map(|turn| turn.placeholder_position);
        let message = self
            .messages
            .iter()
            .enumerate()
            .find(|(position, message)| {
                message.index == Some(index) && in_flight != Some(*position)
            })
            .map(|(_, message)| message)
            .context(UnknownMessageSnafu {
                stage: "report-message",
                index,
            })?;

        let report = MessageReport {
            session_id: self.session.ub_id.clone(),
            message_index: index,
            message_text: message.text.clone(),
            reason: reason.trim().to_string(),
        };
        let surface = self.surface.clone();

        Ok(tokio::spawn(async move {
            match feedback.send_report(&report).await {
                Ok(()) => tracing::info!(
                    ub_id = %report.session_id,
                    message_index = report.message_index,
                    "message report sent"
                ),
                Err(error) => {
                    tracing::warn!(error = %error, "message report failed");
                    surface.show_alert(REPORT_FAILED_ALERT);
                }
            }
        }))
    }

    /// Requests grading in the background; the result is shown only on a visible surface.
    pub fn request_grading(&self) -> SessionResult<JoinHandle<()>> {
        let feedback = self.feedback.clone().context(FeedbackUnavailableSnafu {
            stage: "request-grading",
        })?;
        let ub_id = self.session.ub_id.clone();
        let surface = self.surface.clone();

        Ok(tokio::spawn(async move {
            let result = feedback.request_grade(&ub_id).await;
            if !surface.is_visible() {
                tracing::debug!(ub_id = %ub_id, "surface hidden; skipping grading refresh");
                return;
            }
            match result {
                Ok(grade) => surface.show_grade(&grade),
                Err(error) => {
                    tracing::warn!(ub_id = %ub_id, error = %error, "grading request failed");
                    surface.show_alert(GRADING_FAILED_ALERT);
                }
            }
        }))
    }

    fn transition(&mut self, transition: TurnTransition) -> bool {
        match self.phase.apply(transition) {
            Ok(next) => {
                self.phase = next;
                true
            }
            Err(rejection) => {
                tracing::warn!(?transition, ?rejection, "rejected turn transition");
                false
            }
        }
    }

    /// Appends a message and returns its transcript position.
    fn push_message(&mut self, message: Message) -> usize {
        let message = match message.role {
            Role::Assistant => {
                let replies = self
                    .messages
                    .iter()
                    .filter(|message| message.role == Role::Assistant)
                    .count();
                message.with_index(replies)
            }
            Role::User => message,
        };
        self.messages.push(message);
        self.messages.len() - 1
    }

    fn render_message(&self, message: &Message) -> RenderedContent {
        match message.role {
            Role::User => RenderedContent::Plain(message.text.clone()),
            Role::Assistant => RenderedContent::render(self.renderer.as_deref(), &message.text),
        }
    }

    fn show_partial(&mut self, text: String) {
        let Some(turn) = self.active_turn.as_mut() else {
            return;
        };
        let position = turn.placeholder_position;
        turn.accumulated_text.clone_from(&text);

        let content = RenderedContent::render(self.renderer.as_deref(), &text);
        self.messages[position].text = text;
        self.surface.update_message(position, &content);
    }

    fn finalize(&mut self, text: String) {
        let Some(turn) = self.active_turn.as_mut() else {
            return;
        };
        let position = turn.placeholder_position;
        turn.accumulated_text.clone_from(&text);
        self.messages[position].text = text;

        if !self.surface.is_visible() {
            tracing::debug!(turn = %turn.id, "surface hidden; skipping final render");
            return;
        }

        // Re-render in full: the last chunk may have left the markdown unbalanced.
        let text = &self.messages[position].text;
        let content = RenderedContent::render(self.renderer.as_deref(), text);
        self.surface.update_message(position, &content);

        let blocks = code_blocks(text);
        if !blocks.is_empty() {
            self.surface.attach_code_block_actions(position, &blocks);
        }
    }

    fn show_failure(&mut self, failure: &StreamFailure, accumulated: &str) {
        let Some(turn) = self.active_turn.as_ref() else {
            return;
        };
        let position = turn.placeholder_position;
        tracing::error!(
            ub_id = %self.session.ub_id,
            turn = %turn.id,
            error = %failure.message(),
            partial_len = accumulated.len(),
            "generation turn failed"
        );

        let display = failure_text(failure, accumulated, &self.stream_error_message);
        self.messages[position].text.clone_from(&display);
        self.surface
            .update_message(position, &RenderedContent::Plain(display));
    }

    fn finish_turn(&mut self) {
        // Dropping the event stream tells an unfinished worker to stop reading.
        self.active_turn = None;
        self.surface
            .set_input_enabled(self.session.status.accepts_input());
    }
}

/// Text left in the placeholder after a failed turn.
fn failure_text(failure: &StreamFailure, accumulated: &str, error_message: &str) -> String {
    match failure {
        StreamFailure::Read { .. } if !accumulated.trim().is_empty() => {
            format!("{accumulated}\n\n{error_message}")
        }
        StreamFailure::Read { .. } | StreamFailure::Open { .. } => error_message.to_string(),
    }
}
