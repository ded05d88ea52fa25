use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use snafu::{ResultExt, ensure};

use super::error::{
    BuildHttpClientSnafu, HistoryResult, SourceRequestSnafu, SourceStatusSnafu,
    UserBlockNotFoundSnafu, UserBlockRequestSnafu, UserBlockStatusSnafu,
};
use super::ids::{BlockId, CourseId, LessonId, ThreadId, UbId, UserId};
use super::types::{HistorySourceKind, SessionStatus, UserBlock};

/// Thin JSON-over-HTTP client for the hosted course backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> HistoryResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "backend-client-new",
            })?;
        Ok(Self::with_http(http, base_url))
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// GETs one history endpoint and returns the decoded JSON body.
    pub(crate) async fn get_history_json(
        &self,
        kind: HistorySourceKind,
        path: &str,
        query: &[(&str, &str)],
    ) -> HistoryResult<Value> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .context(SourceRequestSnafu {
                stage: "send-history-request",
                kind,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SourceStatusSnafu {
                stage: "history-http-status",
                kind,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        response.json::<Value>().await.context(SourceRequestSnafu {
            stage: "decode-history-body",
            kind,
        })
    }

    /// Looks up the user-block that anchors a chat session.
    pub async fn lookup_user_block(
        &self,
        path: &str,
        user_id: &UserId,
        block_id: &BlockId,
    ) -> HistoryResult<UserBlock> {
        let response = self
            .http
            .get(self.url(path))
            .query(&[("user_id", user_id.as_str()), ("block_id", block_id.as_str())])
            .send()
            .await
            .context(UserBlockRequestSnafu {
                stage: "send-user-block-request",
            })?;

        let status = response.status();
        ensure!(
            status != reqwest::StatusCode::NOT_FOUND,
            UserBlockNotFoundSnafu {
                stage: "user-block-http-status",
                user_id: user_id.to_string(),
                block_id: block_id.to_string(),
            }
        );
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UserBlockStatusSnafu {
                stage: "user-block-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let payload = response
            .json::<UserBlockPayload>()
            .await
            .context(UserBlockRequestSnafu {
                stage: "decode-user-block",
            })?;

        Ok(payload.into_user_block(user_id, block_id))
    }
}

#[derive(Debug, Deserialize)]
struct UserBlockPayload {
    id: UbId,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    block_id: Option<BlockId>,
    #[serde(default)]
    course_id: Option<CourseId>,
    #[serde(default)]
    lesson_id: Option<LessonId>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    thread_id: Option<ThreadId>,
}

impl UserBlockPayload {
    fn into_user_block(self, user_id: &UserId, block_id: &BlockId) -> UserBlock {
        UserBlock {
            ub_id: self.id,
            user_id: self.user_id.unwrap_or_else(|| user_id.clone()),
            block_id: self.block_id.unwrap_or_else(|| block_id.clone()),
            course_id: self.course_id.unwrap_or_else(|| CourseId::new("")),
            lesson_id: self.lesson_id.unwrap_or_else(|| LessonId::new("")),
            status: self
                .status
                .as_deref()
                .map(SessionStatus::from_wire)
                .unwrap_or_default(),
            thread_id: self.thread_id.filter(|thread_id| !thread_id.is_blank()),
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}
