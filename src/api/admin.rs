//! `POST /v2/admin/login` (SPEC_FULL §2 "admin bootstrap"): verifies
//! `username`/`password` against the `admins` table and, on success, sets a
//! signed `PrivateCookieJar` cookie — the session-cookie alternative to
//! `X-Admin-Key` that §6 names but leaves unspecified.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use time::Duration as TimeDuration;

use crate::error::RelayError;
use crate::server::AppState;
use crate::server::guards::ADMIN_SESSION_COOKIE;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let Some(admin) = state.store.get_admin_by_username(&body.username).await? else {
        return Ok((StatusCode::UNAUTHORIZED, jar).into_response());
    };

    let valid = bcrypt::verify(&body.password, &admin.password_hash).unwrap_or(false);
    if !valid {
        return Ok((StatusCode::UNAUTHORIZED, jar).into_response());
    }

    let cookie = Cookie::build((ADMIN_SESSION_COOKIE, admin.username))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(TimeDuration::hours(12))
        .build();
    let jar = jar.add(cookie);
    Ok((jar, StatusCode::NO_CONTENT).into_response())
}
