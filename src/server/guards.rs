//! Auth extractors (§6, §11). Grounded on the teacher's
//! `server/guards/auth.rs` `RequireKeyAuth` pattern: a unit-struct
//! `FromRequestParts` impl, constant-time key comparison, a Claude-style
//! JSON rejection body.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::PrivateCookieJar;
use subtle::ConstantTimeEq;

use crate::config::CONFIG;
use crate::server::AppState;

pub enum AuthError {
    MissingKey,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AuthError::MissingKey => (StatusCode::UNAUTHORIZED, "authentication_error", "Missing API key"),
            AuthError::InvalidKey => (StatusCode::UNAUTHORIZED, "authentication_error", "Invalid API key"),
        };
        (
            status,
            Json(relaymux_schema::claude::ClaudeErrorBody::new(kind, message)),
        )
            .into_response()
    }
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// §4.11: "Authentication is by optional `X-API-Key` header against a
/// configured secret" — a no-op when `API_KEY` isn't configured.
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyAuth;

impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = &CONFIG.api_key else {
            return Ok(ApiKeyAuth);
        };
        let provided = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingKey)?;
        if ct_eq(provided, expected) {
            Ok(ApiKeyAuth)
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}

pub const ADMIN_SESSION_COOKIE: &str = "relaymux_admin";

/// §6 "admin-authenticated via `X-Admin-Key` or session cookie".
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(provided) = parts.headers.get("x-admin-key").and_then(|v| v.to_str().ok()) {
            if let Some(expected) = &CONFIG.admin_key {
                if ct_eq(provided, expected) {
                    return Ok(AdminAuth);
                }
            }
        }

        let jar = PrivateCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::MissingKey)?;
        if jar.get(ADMIN_SESSION_COOKIE).is_some() {
            return Ok(AdminAuth);
        }
        Err(AuthError::MissingKey)
    }
}
