// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Router tests driven through `tower::ServiceExt::oneshot`, with both
//! platforms mocked by wiremock.

mod common;

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::valid_session;
use signbridge::config::Config;
use signbridge::handlers::AppState;
use signbridge::queue::WebhookReceiver;
use signbridge::runtime::BridgeRuntime;
use signbridge::server;
use signbridge::session::{Platform, Session};
use signbridge::worker::WebhookWorker;

struct TestApp {
    app: Router,
    state: AppState,
    // Owns the queue receiver; dropping it closes the queue.
    _worker: WebhookWorker<WebhookReceiver>,
}

async fn test_app(server: &MockServer, configure: impl FnOnce(Config) -> Config) -> TestApp {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    let config = configure(
        Config::for_base_url(&base).with_export_retry(3, Duration::from_millis(10)),
    );
    let parts = BridgeRuntime::builder()
        .config(config)
        .build()
        .unwrap()
        .into_parts()
        .await
        .unwrap();
    TestApp {
        app: server::router(parts.state.clone(), &[]),
        state: parts.state,
        _worker: parts.worker,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn token_response(access_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access_token,
        "refresh_token": "refresh-2",
        "expires_in": 7200,
        "token_type": "Bearer",
    }))
}

#[tokio::test]
async fn test_health_reports_queue_depth() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(&t.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "queueDepth": 0}));
}

#[tokio::test]
async fn test_auth_status_before_login() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(&t.app, get("/api/auth/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"authenticated": false, "expiresAt": null}));
}

#[tokio::test]
async fn test_refresh_without_refresh_token_requires_login() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(&t.app, post_json("/api/auth/refresh", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"], json!(false));
    assert_eq!(body["loginRequired"], json!(true));
    assert_eq!(body["auth"]["authenticated"], json!(false));
    // No request may reach the token endpoint without a refresh token.
    assert!(mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_uses_token_endpoint() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(token_response("access-2"))
        .expect(1)
        .mount(&mock)
        .await;
    let t = test_app(&mock, |c| c).await;
    t.state
        .coordinator
        .seed(
            Platform::Construction,
            Session {
                access_token: Some("access-1".to_string()),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Some(0),
            },
        )
        .await;

    let (status, body) = send(&t.app, post_json("/api/auth/refresh", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"], json!(true));
    assert_eq!(body["loginRequired"], json!(false));
    assert_eq!(body["auth"]["authenticated"], json!(true));

    let session = t
        .state
        .coordinator
        .store()
        .snapshot(Platform::Construction)
        .await;
    assert_eq!(session.access_token.as_deref(), Some("access-2"));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_refresh_rejected_by_platform_requires_login() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&mock)
        .await;
    let t = test_app(&mock, |c| c).await;
    t.state
        .coordinator
        .seed(
            Platform::Construction,
            Session {
                access_token: None,
                refresh_token: Some("revoked".to_string()),
                expires_at: None,
            },
        )
        .await;

    let (status, body) = send(&t.app, post_json("/api/auth/refresh", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"], json!(false));
    assert_eq!(body["loginRequired"], json!(true));
    assert!(body["error"].as_str().unwrap().contains("400"));
}

#[tokio::test]
async fn test_login_then_callback_establishes_session() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(token_response("access-login"))
        .expect(1)
        .mount(&mock)
        .await;
    let t = test_app(&mock, |c| c).await;

    let response = t.app.clone().oneshot(get("/api/auth/login")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let location = Url::parse(location).unwrap();
    assert_eq!(location.path(), "/oauth/authorize");
    let login_state = location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let (status, body) = send(
        &t.app,
        get(&format!(
            "/api/auth/callback?code=auth-code&state={login_state}"
        )),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], json!(true));
    assert!(body["expiresAt"].as_i64().is_some());

    let (_, status_body) = send(&t.app, get("/api/auth/status")).await;
    assert_eq!(status_body["authenticated"], json!(true));

    // A state value is single use.
    let (status, body) = send(
        &t.app,
        get(&format!(
            "/api/auth/callback?code=auth-code&state={login_state}"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_callback_redirects_when_configured() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response("access-login"))
        .mount(&mock)
        .await;
    let t = test_app(&mock, |c| c.with_post_login_redirect("https://app.example.com/")).await;
    t.state
        .pending_logins
        .lock()
        .await
        .insert("known-state".to_string());

    let response = t
        .app
        .clone()
        .oneshot(get("/api/auth/callback?code=c&state=known-state"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://app.example.com/"
    );
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_rejected() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(&t.app, get("/api/auth/callback?code=c&state=forged")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("BAD_REQUEST"));
    assert!(mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_is_acknowledged_and_queued() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let payload = json!({
        "eventType": "DocumentCompleted",
        "status": "Completed",
        "docId": "doc-42",
        "documentUrl": "https://sign.example.com/documents/doc-42",
        "documentName": "Contract.pdf",
        "completedDate": "2026-03-14",
        "additionalData": "{\"projectId\":\"2001\",\"commitmentId\":\"3001\",\"companyId\":\"1001\"}",
    });
    let (status, body) = send(&t.app, post_json("/api/webhooks/signature", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "received"}));
    assert_eq!(t.state.queue.depth(), 1);

    let (_, health) = send(&t.app, get("/health")).await;
    assert_eq!(health["queueDepth"], json!(1));
}

#[tokio::test]
async fn test_webhook_with_undecodable_metadata_is_still_acknowledged() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let payload = json!({
        "eventType": "DocumentCompleted",
        "status": "Completed",
        "docId": "doc-43",
        "completedDate": "2026-03-14",
        "additionalData": "not json at all",
    });
    let (status, _) = send(&t.app, post_json("/api/webhooks/signature", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.state.queue.depth(), 1);
}

#[tokio::test]
async fn test_structurally_invalid_webhook_fails() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/signature")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"eventType\":"))
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("WEBHOOK_PARSE_FAILED"));
    assert_eq!(t.state.queue.depth(), 0);
}

#[tokio::test]
async fn test_send_without_session_is_unauthorized() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/send",
            json!({"companyId": "1001", "projectId": "2001", "commitmentId": "3001"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("AUTH_REQUIRED"));
}

#[tokio::test]
async fn test_send_exports_pdf() {
    let mock = MockServer::start().await;
    let export_path = "/rest/v1.0/companies/1001/projects/2001/commitment_contracts/3001/pdf";
    Mock::given(method("POST"))
        .and(path(export_path))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path(export_path))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path(export_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'%'; 1024]))
        .mount(&mock)
        .await;
    let t = test_app(&mock, |c| c).await;
    t.state
        .coordinator
        .seed(Platform::Construction, valid_session("send-token"))
        .await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/send",
            json!({"companyId": "1001", "projectId": "2001", "commitmentId": "3001"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "pdfSize": 1024}));
}

#[tokio::test]
async fn test_send_reports_export_timeout() {
    let mock = MockServer::start().await;
    let export_path = "/rest/v1.0/companies/1001/projects/2001/commitment_contracts/3001/pdf";
    Mock::given(method("POST"))
        .and(path(export_path))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path(export_path))
        .respond_with(ResponseTemplate::new(202))
        .mount(&mock)
        .await;
    let t = test_app(&mock, |c| c).await;
    t.state
        .coordinator
        .seed(Platform::Construction, valid_session("send-token"))
        .await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/send",
            json!({"companyId": "1001", "projectId": "2001", "commitmentId": "3001"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("EXPORT_TIMED_OUT"));
}

#[tokio::test]
async fn test_send_rejects_blank_identifiers() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/send",
            json!({"companyId": "", "projectId": "2001", "commitmentId": "3001"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_send_rejects_body_missing_fields() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let (status, body) = send(&t.app, post_json("/api/send", json!({"projectId": "2001"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("BAD_REQUEST"));
    assert!(mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_rejects_non_json_body() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/send")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("companyId=1001"))
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_webhook_queue_stays_open_while_worker_is_held() {
    let mock = MockServer::start().await;
    let t = test_app(&mock, |c| c).await;

    for doc_id in ["doc-1", "doc-2"] {
        let payload = json!({
            "eventType": "DocumentCompleted",
            "status": "Completed",
            "docId": doc_id,
            "completedDate": "2026-03-14",
        });
        let (status, body) = send(&t.app, post_json("/api/webhooks/signature", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "received"}));
    }

    assert_eq!(t.state.queue.depth(), 2);
}
