use std::time::Duration;

use coursechat_history::UbId;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{BuildHttpClientSnafu, FeedbackRequestSnafu, FeedbackStatusSnafu, SessionResult};

/// Report of one message the student flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReport {
    pub session_id: UbId,
    pub message_index: usize,
    pub message_text: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GradeReport {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GradingRequest<'a> {
    session_id: &'a UbId,
}

/// Report and grading calls; both sit outside the streaming turn lifecycle.
#[derive(Debug, Clone)]
pub struct FeedbackClient {
    http: reqwest::Client,
    report_url: String,
    grading_url: String,
}

impl FeedbackClient {
    pub fn new(
        report_url: impl Into<String>,
        grading_url: impl Into<String>,
        timeout: Duration,
    ) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "feedback-client-new",
            })?;
        Ok(Self::with_http(http, report_url, grading_url))
    }

    pub fn with_http(
        http: reqwest::Client,
        report_url: impl Into<String>,
        grading_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            report_url: report_url.into(),
            grading_url: grading_url.into(),
        }
    }

    pub async fn send_report(&self, report: &MessageReport) -> SessionResult<()> {
        let response = self
            .http
            .post(&self.report_url)
            .json(report)
            .send()
            .await
            .context(FeedbackRequestSnafu {
                stage: "send-report",
                endpoint: "report",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return FeedbackStatusSnafu {
                stage: "report-http-status",
                endpoint: "report",
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        Ok(())
    }

    pub async fn request_grade(&self, ub_id: &UbId) -> SessionResult<GradeReport> {
        let response = self
            .http
            .post(&self.grading_url)
            .json(&GradingRequest { session_id: ub_id })
            .send()
            .await
            .context(FeedbackRequestSnafu {
                stage: "send-grading",
                endpoint: "grading",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return FeedbackStatusSnafu {
                stage: "grading-http-status",
                endpoint: "grading",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        response
            .json::<GradeReport>()
            .await
            .context(FeedbackRequestSnafu {
                stage: "decode-grading",
                endpoint: "grading",
            })
    }
}
