use std::sync::Arc;

use super::sources::{HistoryQuery, HistorySource};
use super::types::{HistorySourceKind, ResolvedHistory, assign_reply_indices};

/// Resolves a conversation from the first productive source in priority order.
///
/// Sources are tried one at a time; a failing or empty source hands over to the next,
/// and results from different sources are never mixed.
#[derive(Clone, Default)]
pub struct HistoryResolver {
    sources: Vec<Arc<dyn HistorySource>>,
}

impl HistoryResolver {
    pub fn new(sources: Vec<Arc<dyn HistorySource>>) -> Self {
        Self { sources }
    }

    pub fn with_source(mut self, source: Arc<dyn HistorySource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_kinds(&self) -> Vec<HistorySourceKind> {
        self.sources.iter().map(|source| source.kind()).collect()
    }

    /// Never fails: exhausting every source yields an empty history.
    pub async fn resolve(&self, query: &HistoryQuery) -> ResolvedHistory {
        for source in &self.sources {
            let kind = source.kind();
            if kind == HistorySourceKind::ThreadApi && query.thread_id.is_none() {
                tracing::debug!(ub_id = %query.ub_id, "no thread id; skipping thread transcript");
                continue;
            }

            match source.load(query).await {
                Ok(messages) if !messages.is_empty() => {
                    tracing::info!(
                        ub_id = %query.ub_id,
                        source = %kind,
                        message_count = messages.len(),
                        "resolved chat history"
                    );
                    let mut messages = messages;
                    assign_reply_indices(&mut messages);
                    return ResolvedHistory {
                        source: kind,
                        messages,
                    };
                }
                Ok(_) => {
                    tracing::debug!(ub_id = %query.ub_id, source = %kind, "history source empty");
                }
                Err(error) => {
                    tracing::warn!(
                        ub_id = %query.ub_id,
                        source = %kind,
                        unavailable = error.is_source_unavailable(),
                        error = %error,
                        "history source failed; trying next source"
                    );
                }
            }
        }

        tracing::info!(ub_id = %query.ub_id, "no chat history found");
        ResolvedHistory::empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{HistoryResult, MalformedRecordSnafu};
    use crate::ids::{ThreadId, UbId};
    use crate::sources::BoxFuture;
    use crate::types::{Message, Role};

    enum Scripted {
        Messages(Vec<&'static str>),
        Fail,
    }

    struct FakeSource {
        kind: HistorySourceKind,
        script: Scripted,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(kind: HistorySourceKind, script: Scripted) -> Arc<Self> {
            Arc::new(Self {
                kind,
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HistorySource for FakeSource {
        fn kind(&self) -> HistorySourceKind {
            self.kind
        }

        fn load<'a>(
            &'a self,
            _query: &'a HistoryQuery,
        ) -> BoxFuture<'a, HistoryResult<Vec<Message>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                match &self.script {
                    Scripted::Messages(texts) => Ok(texts
                        .iter()
                        .enumerate()
                        .map(|(position, text)| match position % 2 {
                            0 => Message::user(*text),
                            _ => Message::assistant(*text),
                        })
                        .collect()),
                    Scripted::Fail => MalformedRecordSnafu {
                        stage: "fake-source",
                        kind: self.kind,
                        details: "scripted failure".to_string(),
                    }
                    .fail(),
                }
            })
        }
    }

    fn query(thread: Option<&str>) -> HistoryQuery {
        HistoryQuery::new(UbId::from("ub-1"), thread.map(ThreadId::from))
    }

    fn resolver(sources: &[Arc<FakeSource>]) -> HistoryResolver {
        HistoryResolver::new(
            sources
                .iter()
                .map(|source| source.clone() as Arc<dyn HistorySource>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn first_productive_source_short_circuits() {
        let workflow = FakeSource::new(
            HistorySourceKind::Workflow,
            Scripted::Messages(vec!["a", "b"]),
        );
        let legacy = FakeSource::new(
            HistorySourceKind::LegacyRecord,
            Scripted::Messages(vec!["x"]),
        );
        let thread = FakeSource::new(HistorySourceKind::ThreadApi, Scripted::Messages(vec!["y"]));

        let resolved = resolver(&[workflow.clone(), legacy.clone(), thread.clone()])
            .resolve(&query(Some("t-1")))
            .await;

        assert_eq!(resolved.source, HistorySourceKind::Workflow);
        assert_eq!(
            resolved
                .messages
                .iter()
                .map(|message| (message.text.as_str(), message.index))
                .collect::<Vec<_>>(),
            vec![("a", None), ("b", Some(0))]
        );
        assert_eq!(workflow.calls(), 1);
        assert_eq!(legacy.calls(), 0);
        assert_eq!(thread.calls(), 0);
    }

    #[tokio::test]
    async fn failures_and_empty_results_fall_through() {
        let workflow = FakeSource::new(HistorySourceKind::Workflow, Scripted::Fail);
        let legacy = FakeSource::new(HistorySourceKind::LegacyRecord, Scripted::Messages(vec![]));
        let thread = FakeSource::new(
            HistorySourceKind::ThreadApi,
            Scripted::Messages(vec!["from thread"]),
        );

        let resolved = resolver(&[workflow.clone(), legacy.clone(), thread.clone()])
            .resolve(&query(Some("t-1")))
            .await;

        assert_eq!(resolved.source, HistorySourceKind::ThreadApi);
        assert_eq!(resolved.messages[0].role, Role::User);
        assert_eq!(resolved.messages[0].text, "from thread");
        assert_eq!((workflow.calls(), legacy.calls(), thread.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn exhaustion_is_an_empty_history() {
        let workflow = FakeSource::new(HistorySourceKind::Workflow, Scripted::Fail);
        let legacy = FakeSource::new(HistorySourceKind::LegacyRecord, Scripted::Fail);
        let thread = FakeSource::new(HistorySourceKind::ThreadApi, Scripted::Fail);

        let resolved = resolver(&[workflow, legacy, thread])
            .resolve(&query(Some("t-1")))
            .await;

        assert_eq!(resolved, ResolvedHistory::empty());
        assert_eq!(resolved.source, HistorySourceKind::None);
    }

    #[tokio::test]
    async fn thread_source_needs_a_thread_id() {
        let thread = FakeSource::new(
            HistorySourceKind::ThreadApi,
            Scripted::Messages(vec!["never"]),
        );

        let resolved = resolver(&[thread.clone()]).resolve(&query(None)).await;

        assert!(resolved.is_empty());
        assert_eq!(thread.calls(), 0);
    }
}
