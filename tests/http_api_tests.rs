use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use relaymux::cache::PromptCacheSimulator;
use relaymux::config::CONFIG;
use relaymux::db::{CallLogRecorder, CredentialStore, UsageTracker};
use relaymux::pool::AccountPool;
use relaymux::server::{self, AppState};
use relaymux::token::{AuthSessionRegistry, TokenManager};
use relaymux::Orchestrator;
use relaymux_thinking::ThoughtSignatureEngine;
use tower::ServiceExt;

async fn test_app() -> (axum::Router, CredentialStore) {
    let store = CredentialStore::connect_memory().await.expect("in-memory store");
    let call_log = CallLogRecorder::new(store.pool().clone());
    let pool = AccountPool::new(store.clone(), call_log);
    let http = reqwest::Client::new();
    let tokens = TokenManager::new(store.clone(), http.clone());
    let cache = Arc::new(PromptCacheSimulator::new(CONFIG.cache_ttl_seconds, CONFIG.max_cache_entries));
    let usage = UsageTracker::new(store.pool().clone());
    let signatures = Arc::new(ThoughtSignatureEngine::new(3600, 1024));
    let auth_sessions = Arc::new(AuthSessionRegistry::new());

    let orchestrator = Orchestrator::new(pool.clone(), tokens.clone(), cache, usage.clone(), http, signatures);

    let state = AppState {
        orchestrator,
        store: store.clone(),
        pool,
        tokens,
        usage,
        auth_sessions,
        base_url: String::new(),
    };
    (server::router(state), store)
}

#[tokio::test]
async fn health_reports_zero_accounts_on_a_fresh_store() {
    let (app, _store) = test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body_str = std::str::from_utf8(&body).unwrap();
    assert!(body_str.contains("\"status\":\"ok\""));
    assert!(body_str.contains("\"total_accounts\":0"));
}

#[tokio::test]
async fn admin_routes_reject_requests_without_a_key_or_session() {
    let (app, _store) = test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/v2/accounts").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn count_tokens_accepts_an_unauthenticated_request_when_no_api_key_is_configured() {
    let (app, _store) = test_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages/count_tokens")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"model":"claude-3-5-sonnet-20241022","max_tokens":1024,"messages":[{"role":"user","content":"hello there"}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body_str = std::str::from_utf8(&body).unwrap();
    assert!(body_str.contains("input_tokens"));
}

#[tokio::test]
async fn messages_without_stream_true_is_rejected_as_a_bad_request() {
    let (app, _store) = test_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"model":"claude-3-5-sonnet-20241022","max_tokens":1024,"messages":[{"role":"user","content":"hi"}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn messages_with_no_eligible_account_returns_service_unavailable() {
    let (app, _store) = test_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"model":"claude-3-5-sonnet-20241022","max_tokens":1024,"stream":true,"messages":[{"role":"user","content":"hi"}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_login_rejects_a_wrong_password() {
    let (app, store) = test_app().await;
    let password_hash = bcrypt::hash("swordfish", bcrypt::DEFAULT_COST).unwrap();
    store.create_admin("root", &password_hash).await.unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v2/admin/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"root","password":"wrong"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_login_then_session_cookie_grants_access_to_account_routes() {
    let (app, store) = test_app().await;
    let password_hash = bcrypt::hash("swordfish", bcrypt::DEFAULT_COST).unwrap();
    store.create_admin("root", &password_hash).await.unwrap();

    let login_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v2/admin/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"root","password":"swordfish"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login_resp.status(), StatusCode::NO_CONTENT);
    let set_cookie = login_resp
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .expect("login response carries a Set-Cookie header")
        .to_str()
        .unwrap()
        .to_string();
    let cookie_value = set_cookie.split(';').next().unwrap().to_string();

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/v2/accounts")
                .header(axum::http::header::COOKIE, cookie_value)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), "[]");
}

#[tokio::test]
async fn unknown_routes_fall_back_to_404() {
    let (app, _store) = test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
