//! End-to-end exercises of the support API over the axum router, backed by
//! the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use supportbot::chatbot::{configure_support_routes, ChatEngine};
use supportbot::config::AppConfig;
use supportbot::escalation::{EscalationNotice, EscalationNotifier, NotifyError};
use supportbot::flow::catalog::benefits_flow;
use supportbot::shared::state::AppState;
use supportbot::store::memory::MemoryStore;

struct RecordingNotifier {
    fail: bool,
}

#[async_trait]
impl EscalationNotifier for RecordingNotifier {
    async fn notify(&self, _notice: EscalationNotice) -> Result<(), NotifyError> {
        if self.fail {
            Err(NotifyError::Smtp("simulated outage".into()))
        } else {
            Ok(())
        }
    }
}

fn app(fail_notifier: bool) -> Router {
    let engine = ChatEngine::new(
        Arc::new(benefits_flow()),
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier { fail: fail_notifier }),
        Duration::from_millis(200),
    );
    let state = AppState::new(AppConfig::from_env(), engine);
    configure_support_routes().with_state(state)
}

fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn start_requires_authentication() {
    let app = app(false);
    let response = app
        .oneshot(request("POST", "/api/support/sessions", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guided_conversation_round_trip() {
    let app = app(false);
    let user = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/support/sessions", Some(user), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let start = json_body(response).await;
    assert_eq!(start["state_key"], "start");
    assert_eq!(start["options"].as_array().unwrap().len(), 4);
    let ticket_id = start["ticket_id"].as_str().unwrap().to_string();

    let uri = format!("/api/support/sessions/{ticket_id}/messages");
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &uri,
            Some(user),
            Some(json!({ "state_key": "start", "option_id": "claims" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let step = json_body(response).await;
    assert_eq!(step["state_key"], "claims_menu");
    assert_eq!(step["is_terminal"], false);

    // Both turn kinds in one request is a caller mistake.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &uri,
            Some(user),
            Some(json!({
                "state_key": "claims_menu",
                "option_id": "file_claim",
                "message": "also this"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &uri,
            Some(user),
            Some(json!({ "message": "my claim was rejected" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let escalation = json_body(response).await;
    assert_eq!(escalation["status"], "in_progress");
    assert_eq!(escalation["email_sent"], true);

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/support/tickets/{ticket_id}/history"),
            Some(user),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = json_body(response).await;
    assert_eq!(history["status"], "in_progress");
    // greeting, selection, menu prompt, free text, acknowledgment
    assert_eq!(history["chat_history"].as_array().unwrap().len(), 5);
    assert_eq!(history["status_history"].as_array().unwrap().len(), 2);
    let kinds: Vec<&str> = history["chat_history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["message"]["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["prompt", "selection", "prompt", "text", "text"]);
}

#[tokio::test]
async fn history_is_denied_for_other_users() {
    let app = app(false);
    let owner = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/support/sessions", Some(owner), None))
        .await
        .unwrap();
    let ticket_id = json_body(response).await["ticket_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(request(
            "GET",
            &format!("/api/support/tickets/{ticket_id}/history"),
            Some(Uuid::new_v4()),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn escalation_outage_still_creates_the_ticket() {
    let app = app(true);
    let user = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/support/sessions", Some(user), None))
        .await
        .unwrap();
    let ticket_id = json_body(response).await["ticket_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/api/support/sessions/{ticket_id}/messages"),
            Some(user),
            Some(json!({ "message": "nobody answers" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let escalation = json_body(response).await;
    assert_eq!(escalation["email_sent"], false);
    assert_eq!(escalation["status"], "in_progress");

    let response = app
        .oneshot(request(
            "GET",
            &format!("/api/support/tickets/{ticket_id}/history"),
            Some(user),
            None,
        ))
        .await
        .unwrap();
    let history = json_body(response).await;
    assert_eq!(history["status"], "in_progress");
    assert_eq!(history["chat_history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn status_updates_validate_the_enum() {
    let app = app(false);
    let user = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/support/sessions", Some(user), None))
        .await
        .unwrap();
    let ticket_id = json_body(response).await["ticket_id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/support/tickets/{ticket_id}/status");

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &uri,
            Some(user),
            Some(json!({ "status": "escalated" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &uri,
            Some(user),
            Some(json!({ "status": "resolved", "remarks": "answered by phone" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = json_body(response).await;
    assert_eq!(reply["old_status"], "open");
    assert_eq!(reply["new_status"], "resolved");

    let response = app
        .oneshot(request(
            "GET",
            "/api/support/tickets?status=resolved",
            Some(user),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["is_resolved"], true);
}

#[tokio::test]
async fn stale_state_replay_conflicts() {
    let app = app(false);
    let user = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/support/sessions", Some(user), None))
        .await
        .unwrap();
    let ticket_id = json_body(response).await["ticket_id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/support/sessions/{ticket_id}/messages");

    let first = request(
        "POST",
        &uri,
        Some(user),
        Some(json!({ "state_key": "start", "option_id": "claims" })),
    );
    assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::OK);

    let replay = request(
        "POST",
        &uri,
        Some(user),
        Some(json!({ "state_key": "start", "option_id": "coverage" })),
    );
    assert_eq!(
        app.oneshot(replay).await.unwrap().status(),
        StatusCode::CONFLICT
    );
}
