//! Amazon Q device-code flow (§4.2, §6). `start` registers a client and
//! requests a device code; `claim` blocks on the poll loop up to the
//! 5-minute ceiling and, on success, persists a new `amazon_q` account;
//! `status` is a non-blocking peek at session state.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;

use crate::db::{Account, ChannelType, Extension};
use crate::error::RelayError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct StartAuthResponse {
    pub auth_id: String,
    pub verification_uri_complete: String,
    pub user_code: String,
    pub expires_in: u64,
    pub interval: u64,
}

pub async fn start(State(state): State<AppState>) -> Result<Json<StartAuthResponse>, RelayError> {
    let session = state
        .auth_sessions
        .start(state.tokens.http_client(), &state.base_url)
        .await
        .map_err(RelayError::Token)?;
    Ok(Json(StartAuthResponse {
        auth_id: session.auth_id,
        verification_uri_complete: session.verification_uri,
        user_code: session.user_code,
        expires_in: session.expires_in_s,
        interval: session.interval_s,
    }))
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub account_id: String,
}

pub async fn claim(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<ClaimResponse>, RelayError> {
    let completed = state
        .auth_sessions
        .claim(state.tokens.http_client(), &auth_id)
        .await
        .map_err(RelayError::Token)?;

    let now = Utc::now();
    let account = Account {
        id: uuid::Uuid::new_v4().to_string(),
        channel: ChannelType::AmazonQ,
        label: format!("amazon-q-{}", &auth_id[..8.min(auth_id.len())]),
        client_id: completed.client_id,
        client_secret: completed.client_secret,
        refresh_token: completed.refresh_token.unwrap_or_default(),
        access_token: Some(completed.access_token),
        // Unknown real TTL from the device-token response; forcing an
        // immediate refresh on first use is cheaper than guessing wrong.
        token_expires_at: Some(now),
        extension: Extension::default(),
        model_mappings: Vec::new(),
        enabled: true,
        weight: 50,
        rate_limit_per_hour: 20,
        cooldown_until: None,
        last_used_at: None,
        request_count: 0,
        success_count: 0,
        error_count: 0,
        error_streak: 0,
        last_refresh_status: None,
        last_refresh_at: None,
        created_at: now,
        updated_at: now,
    };
    state.store.create(&account).await?;
    Ok(Json(ClaimResponse { account_id: account.id }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: crate::token::AuthStatus,
}

pub async fn status(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<StatusResponse>, RelayError> {
    let session = state
        .auth_sessions
        .get(&auth_id)
        .ok_or_else(|| RelayError::InvalidRequest("unknown auth session".to_string()))?;
    Ok(Json(StatusResponse { status: session.status }))
}
