use std::sync::Arc;

use coursechat_history::{
    BackendClient, BlockId, HistoryQuery, HistoryResolver, HistorySource, LegacyRecordSource,
    ThreadTranscriptSource, UserId, WorkflowSource,
};
use coursechat_stream::{GenerationBackend, HttpGenerationClient};
use snafu::ResultExt;

use crate::chat::{ChatSession, ChatSurface, FeedbackClient, MarkdownRenderer, SessionController};
use crate::error::{BuildBackendSnafu, BuildGenerationSnafu, LookupUserBlockSnafu, SessionResult};
use crate::settings::SessionSettings;

/// Backend clients shared by every session opened from one settings snapshot.
pub struct SessionServices {
    settings: Arc<SessionSettings>,
    backend: BackendClient,
    resolver: HistoryResolver,
    generation: Arc<dyn GenerationBackend>,
    feedback: FeedbackClient,
}

impl SessionServices {
    pub fn from_settings(settings: Arc<SessionSettings>) -> SessionResult<Self> {
        let backend = BackendClient::new(&settings.api_base_url, settings.request_timeout())
            .context(BuildBackendSnafu {
                stage: "services-backend-client",
            })?;

        let sources: Vec<Arc<dyn HistorySource>> = vec![
            Arc::new(WorkflowSource::new(backend.clone(), &settings.workflow_path)),
            Arc::new(LegacyRecordSource::new(backend.clone(), &settings.legacy_path)),
            Arc::new(ThreadTranscriptSource::new(
                backend.http().clone(),
                &settings.thread_api_base_url,
                &settings.thread_api_key,
            )),
        ];

        let generation = HttpGenerationClient::new(
            settings.endpoint_url(&settings.generation_path),
            settings.stream_framing,
        )
        .context(BuildGenerationSnafu {
            stage: "services-generation-client",
        })?;

        let feedback = FeedbackClient::new(
            settings.endpoint_url(&settings.report_path),
            settings.endpoint_url(&settings.grading_path),
            settings.request_timeout(),
        )?;

        Ok(Self {
            settings,
            backend,
            resolver: HistoryResolver::new(sources),
            generation: Arc::new(generation),
            feedback,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Looks up the user block, resolves its history and hands back a controller with the
    /// transcript already rendered.
    ///
    /// Only the lookup can fail; an unresolvable history opens an empty session.
    pub async fn open_session(
        &self,
        user_id: &UserId,
        block_id: &BlockId,
        surface: Arc<dyn ChatSurface>,
        renderer: Option<Arc<dyn MarkdownRenderer>>,
    ) -> SessionResult<SessionController> {
        let block = self
            .backend
            .lookup_user_block(&self.settings.user_block_path, user_id, block_id)
            .await
            .context(LookupUserBlockSnafu {
                stage: "open-session-lookup",
            })?;
        let session = ChatSession::from_user_block(block);
        tracing::info!(
            ub_id = %session.ub_id,
            course_id = %session.course_id,
            lesson_id = %session.lesson_id,
            status = ?session.status,
            has_thread = session.thread_id.is_some(),
            "chat session opened"
        );

        let query = HistoryQuery::new(session.ub_id.clone(), session.thread_id.clone());
        let history = self.resolver.resolve(&query).await;

        let mut controller = SessionController::new(session, self.generation.clone(), surface)
            .with_feedback(self.feedback.clone())
            .with_stream_error_message(self.settings.stream_error_message.clone());
        if let Some(renderer) = renderer {
            controller = controller.with_renderer(renderer);
        }
        controller.load_history(history);

        Ok(controller)
    }
}
