mod common;

use std::sync::Arc;

use coursechat::chat::{GradeReport, REPORT_FAILED_ALERT, TurnPhase};
use coursechat::error::SessionError;
use coursechat::settings::SessionSettings;
use coursechat::{SessionController, SessionServices};
use coursechat_history::{BlockId, HistorySourceKind, Role, SessionStatus, UserId};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{RecordingSurface, SurfaceCall};

fn services_for(server: &MockServer) -> SessionServices {
    let settings = SessionSettings {
        api_base_url: server.uri(),
        thread_api_base_url: format!("{}/v1", server.uri()),
        thread_api_key: "sk-test".to_string(),
        ..SessionSettings::default()
    };
    SessionServices::from_settings(Arc::new(settings)).unwrap()
}

async fn mount_user_block(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/user_blocks/lookup"))
        .and(query_param("user_id", "u-1"))
        .and(query_param("block_id", "b-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 77,
            "course_id": "course-3",
            "lesson_id": "lesson-5",
            "status": status,
            "thread_id": ""
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn open(
    services: &SessionServices,
    surface: &Arc<RecordingSurface>,
) -> Result<SessionController, SessionError> {
    services
        .open_session(&UserId::new("u-1"), &BlockId::new("b-1"), surface.clone(), None)
        .await
}

#[tokio::test]
async fn session_loads_history_streams_and_reports() {
    let server = MockServer::start().await;
    mount_user_block(&server, "started").await;
    Mock::given(method("GET"))
        .and(path("/workflow_state"))
        .and(query_param("ub_id", "77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answers": [{"interviewer_question": "Ready?", "answer": "Yes"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(body_json(json!({"sessionId": "77", "content": "What is 2+2?"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("4 is the answer"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .and(body_json(json!({
            "sessionId": "77",
            "messageIndex": 1,
            "messageText": "4 is the answer",
            "reason": "too terse"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/grading"))
        .and(body_json(json!({"sessionId": "77"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"score": 9.5, "feedback": "Good"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let surface = RecordingSurface::new();
    let mut controller = open(&services_for(&server), &surface).await.unwrap();

    assert_eq!(controller.session().status, SessionStatus::Started);
    assert_eq!(controller.session().history_source, HistorySourceKind::Workflow);
    assert_eq!(controller.session().thread_id, None);
    assert_eq!(controller.messages().len(), 2);

    controller.submit("What is 2+2?");
    assert_eq!(controller.drive_turn().await, TurnPhase::Idle);
    assert_eq!(controller.messages()[3].role, Role::Assistant);
    assert_eq!(controller.messages()[3].text, "4 is the answer");

    assert_eq!(controller.messages()[3].index, Some(1));
    controller.report_message(1, "too terse").unwrap().await.unwrap();
    controller.request_grading().unwrap().await.unwrap();

    assert!(surface.alerts().is_empty());
    assert!(surface.calls().contains(&SurfaceCall::Grade(GradeReport {
        score: Some(9.5),
        feedback: Some("Good".to_string()),
    })));
}

#[tokio::test]
async fn missing_history_opens_an_empty_session() {
    let server = MockServer::start().await;
    mount_user_block(&server, "idle").await;
    Mock::given(method("GET"))
        .and(path("/workflow_state"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/air"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let surface = RecordingSurface::new();
    let controller = open(&services_for(&server), &surface).await.unwrap();

    assert!(controller.messages().is_empty());
    assert_eq!(controller.session().history_source, HistorySourceKind::None);
    assert_eq!(surface.calls(), vec![SurfaceCall::Input(true)]);
}

#[tokio::test]
async fn failed_report_raises_an_alert() {
    let server = MockServer::start().await;
    mount_user_block(&server, "started").await;
    Mock::given(method("GET"))
        .and(path("/workflow_state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answers": [{"interviewer_question": "Ready?"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(1)
        .mount(&server)
        .await;

    let surface = RecordingSurface::new();
    let controller = open(&services_for(&server), &surface).await.unwrap();
    controller.report_message(0, "confusing").unwrap().await.unwrap();

    assert_eq!(surface.alerts(), vec![REPORT_FAILED_ALERT.to_string()]);
}

#[tokio::test]
async fn hidden_surface_ignores_late_grades() {
    let server = MockServer::start().await;
    mount_user_block(&server, "finished").await;
    Mock::given(method("GET"))
        .and(path("/workflow_state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answers": [{"answer": "done"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/grading"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let surface = RecordingSurface::new();
    let controller = open(&services_for(&server), &surface).await.unwrap();
    assert_eq!(surface.calls().last(), Some(&SurfaceCall::Input(false)));

    surface.set_visible(false);
    controller.request_grading().unwrap().await.unwrap();

    assert!(
        !surface
            .calls()
            .iter()
            .any(|call| matches!(call, SurfaceCall::Grade(_)))
    );
}

#[tokio::test]
async fn unknown_user_block_fails_to_open() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user_blocks/lookup"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let surface = RecordingSurface::new();
    let result = open(&services_for(&server), &surface).await;

    assert!(matches!(result, Err(SessionError::LookupUserBlock { .. })));
    assert!(surface.calls().is_empty());
}
