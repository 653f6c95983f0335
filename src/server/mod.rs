//! HTTP surface assembly (C11, §6). Grounded on the teacher's
//! `server/router.rs`: one `AppState` threaded through every handler via
//! `FromRef`, an access-log middleware wrapping the whole router, and a
//! cookie-signing key for the admin session alternative to `X-Admin-Key`.

pub mod guards;

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use axum::extract::{FromRef, Request};
use axum::http::{HeaderName, HeaderValue, StatusCode, Version, header::USER_AGENT};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::Key;
use base64::Engine as _;
use rand::RngCore;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api;
use crate::db::CredentialStore;
use crate::orchestrator::Orchestrator;
use crate::pool::AccountPool;
use crate::token::{AuthSessionRegistry, TokenManager};
use crate::db::UsageTracker;

static COOKIE_KEY: LazyLock<Key> = LazyLock::new(Key::generate);

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: CredentialStore,
    pub pool: AccountPool,
    pub tokens: TokenManager,
    pub usage: UsageTracker,
    pub auth_sessions: Arc<AuthSessionRegistry>,
    pub base_url: String,
}

impl FromRef<AppState> for Key {
    fn from_ref(_state: &AppState) -> Self {
        COOKIE_KEY.clone()
    }
}

fn generate_request_id() -> String {
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    let path = uri.path();
    let protocol = format_http_version(version);

    if status.is_server_error() {
        error!(%request_id, method = %method, %protocol, path, latency_ms, %user_agent, status = status.as_u16(), "request");
    } else if status.is_client_error() {
        warn!(%request_id, method = %method, %protocol, path, latency_ms, %user_agent, status = status.as_u16(), "request");
    } else {
        info!(%request_id, method = %method, %protocol, path, latency_ms, %user_agent, status = status.as_u16(), "request");
    }

    resp
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    enabled_accounts: i64,
    total_accounts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tested_account: Option<String>,
}

/// `GET /health` (§6).
async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<HealthBody> {
    let accounts = state.store.list_accounts().await.unwrap_or_default();
    let enabled_accounts = accounts.iter().filter(|a| a.enabled).count() as i64;
    Json(HealthBody {
        status: "ok",
        enabled_accounts,
        total_accounts: accounts.len() as i64,
        tested_account: accounts.first().map(|a| a.id.clone()),
    })
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/v1/messages", post(api::messages::messages))
        .route("/v1/gemini/messages", post(api::messages::gemini_messages))
        .route("/v1/messages/count_tokens", post(api::messages::count_tokens))
        .route("/v1/usage", get(api::usage::get_usage))
        .route_layer(middleware::from_extractor_with_state::<guards::ApiKeyAuth, _>(
            state.clone(),
        ));

    let public = Router::new().merge(v1).route("/health", get(health));

    let admin = Router::new()
        .route("/v2/accounts", get(api::accounts::list).post(api::accounts::create))
        .route(
            "/v2/accounts/{id}",
            patch(api::accounts::update).delete(api::accounts::delete),
        )
        .route("/v2/accounts/{id}/refresh", post(api::accounts::refresh))
        .route("/v2/accounts/{id}/stats", get(api::accounts::stats))
        .route_layer(middleware::from_extractor_with_state::<guards::AdminAuth, _>(
            state.clone(),
        ));

    let auth = Router::new()
        .route("/v2/auth/start", post(api::auth::start))
        .route("/v2/auth/claim/{auth_id}", post(api::auth::claim))
        .route("/v2/auth/status/{auth_id}", get(api::auth::status));

    let admin_login = Router::new().route("/v2/admin/login", post(api::admin::login));

    Router::new()
        .merge(public)
        .merge(admin)
        .merge(auth)
        .merge(admin_login)
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
