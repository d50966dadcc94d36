//! Integration tests for sessions, conversations and service endpoints

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use chat_proto::{ConversationWithMessages, Role, Session};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_health_check() {
    let state = test_state(ScriptedLlm::replying(&["hi"]), None);
    let app = create_test_app(&state);

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let state = test_state(ScriptedLlm::replying(&["hi"]), None);
    let app = create_test_app(&state);
    create_conversation(&app).await;

    let (status, body) = call(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let metrics = json_body(&body);
    assert!(metrics["system"]["request_count"].as_u64().unwrap() >= 1);
    assert_eq!(metrics["turns"]["turns_started"], 0);
}

#[tokio::test]
async fn test_response_carries_request_id() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let state = test_state(ScriptedLlm::replying(&["hi"]), None);
    let app = create_test_app(&state);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_session_questionnaire_flow() {
    let state = test_state(ScriptedLlm::replying(&["hi"]), None);
    let app = create_test_app(&state);

    let (status, body) = call(&app, "POST", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let session: Session = serde_json::from_slice(&body).unwrap();
    assert!(!session.is_complete);
    let uri = format!("/api/sessions/{}", session.id);

    let (status, _) = call(
        &app,
        "PATCH",
        &uri,
        Some(json!({ "question1": "my grandmother's garden", "question2": "the sea" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Generating with half the answers is rejected.
    let (status, body) = call(&app, "POST", &format!("{uri}/generate"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], 400);

    let (status, body) = call(
        &app,
        "PATCH",
        &uri,
        Some(json!({ "question3": "a calm face", "question4": "to be heard" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session: Session = serde_json::from_slice(&body).unwrap();
    assert_eq!(session.question1.as_deref(), Some("my grandmother's garden"));
    assert_eq!(session.question4.as_deref(), Some("to be heard"));

    let (status, body) = call(&app, "POST", &format!("{uri}/generate"), None).await;
    assert_eq!(status, StatusCode::OK);
    let session: Session = serde_json::from_slice(&body).unwrap();
    assert!(session.is_complete);
    assert_eq!(session.spirit_name.as_deref(), Some("Breath of Dawn"));
    let conversation_id = session.conversation_id.expect("conversation opened");

    let (status, body) = call(&app, "GET", &format!("/api/conversations/{conversation_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let conversation: ConversationWithMessages = serde_json::from_slice(&body).unwrap();
    assert_eq!(conversation.conversation.title, "Breath of Dawn");
    let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::Assistant]);
    assert_eq!(
        conversation.visible_messages().next().map(|m| m.content.as_str()),
        Some("The loneliness of dawn, you said?")
    );
}

#[tokio::test]
async fn test_session_errors() {
    let state = test_state(ScriptedLlm::replying(&["hi"]), None);
    let app = create_test_app(&state);

    let (status, _) = call(&app, "GET", "/api/sessions/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/sessions/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "PATCH",
        "/api/sessions/999",
        Some(json!({ "question1": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conversation_lifecycle() {
    let state = test_state(ScriptedLlm::replying(&["hi"]), None);
    let app = create_test_app(&state);

    let first = create_conversation(&app).await;
    let (status, body) = call(&app, "POST", "/api/conversations", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json_body(&body)["title"], "New conversation");
    let second = json_body(&body)["id"].as_i64().unwrap();

    let (status, body) = call(&app, "GET", "/api/conversations", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = json_body(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let (status, _) = call(&app, "DELETE", &format!("/api/conversations/{first}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", &format!("/api/conversations/{first}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "Conversation not found");

    let (status, _) = call(&app, "DELETE", &format!("/api/conversations/{first}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/api/conversations/0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slow_request_is_cut_off_with_408() {
    let mut state = test_state(ScriptedLlm::slow(&[], Duration::from_millis(1500)), None);
    state.config.request_timeout_secs = 1;
    let app = create_test_app(&state);

    let (_, body) = call(&app, "POST", "/api/sessions", None).await;
    let session: Session = serde_json::from_slice(&body).unwrap();
    let uri = format!("/api/sessions/{}", session.id);
    let answers = json!({
        "question1": "a garden",
        "question2": "the sea",
        "question3": "a calm face",
        "question4": "to be heard"
    });
    let (status, _) = call(&app, "PATCH", &uri, Some(answers)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "POST", &format!("{uri}/generate"), None).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_rate_limit_answers_429_from_the_governor() {
    let mut state = test_state(ScriptedLlm::replying(&["hi"]), None);
    state.config.rate_limit_per_minute = 2;
    let app = create_test_app(&state);

    for _ in 0..2 {
        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
