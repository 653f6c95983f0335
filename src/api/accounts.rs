//! `/v2/accounts*` (§6, admin-authenticated). CRUD plus the two
//! operational endpoints (`refresh`, `stats`); the response shape never
//! echoes `client_secret`/`refresh_token`/`access_token` back to the caller.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Account, ChannelType, Extension, ModelMapping};
use crate::error::RelayError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: String,
    pub channel: ChannelType,
    pub label: String,
    pub extension: Extension,
    pub model_mappings: Vec<ModelMapping>,
    pub enabled: bool,
    pub weight: u32,
    pub rate_limit_per_hour: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub error_streak: u32,
    pub last_refresh_status: Option<String>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        AccountView {
            id: account.id,
            channel: account.channel,
            label: account.label,
            extension: account.extension,
            model_mappings: account.model_mappings,
            enabled: account.enabled,
            weight: account.weight,
            rate_limit_per_hour: account.rate_limit_per_hour,
            cooldown_until: account.cooldown_until,
            last_used_at: account.last_used_at,
            request_count: account.request_count,
            success_count: account.success_count,
            error_count: account.error_count,
            error_streak: account.error_streak,
            last_refresh_status: account.last_refresh_status,
        }
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<AccountView>>, RelayError> {
    let accounts = state.store.list_accounts().await?;
    Ok(Json(accounts.into_iter().map(AccountView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub channel: ChannelType,
    pub label: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub extension: Extension,
    #[serde(default)]
    pub model_mappings: Vec<ModelMapping>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_hour: u32,
}

fn default_true() -> bool {
    true
}
fn default_weight() -> u32 {
    50
}
fn default_rate_limit() -> u32 {
    20
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountView>), RelayError> {
    let now = Utc::now();
    let account = Account {
        id: uuid::Uuid::new_v4().to_string(),
        channel: body.channel,
        label: body.label,
        client_id: body.client_id,
        client_secret: body.client_secret,
        refresh_token: body.refresh_token,
        access_token: None,
        token_expires_at: None,
        extension: body.extension,
        model_mappings: body.model_mappings,
        enabled: body.enabled,
        weight: body.weight,
        rate_limit_per_hour: body.rate_limit_per_hour,
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
    Ok((StatusCode::CREATED, Json(account.into())))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountRequest {
    pub enabled: Option<bool>,
    pub weight: Option<u32>,
    pub model_mappings: Option<Vec<ModelMapping>>,
    pub extension: Option<Extension>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAccountRequest>,
) -> Result<Json<AccountView>, RelayError> {
    if let Some(enabled) = body.enabled {
        state.store.set_enabled(&id, enabled).await?;
    }
    if let Some(weight) = body.weight {
        state.store.update_weight(&id, weight).await?;
    }
    if let Some(mappings) = &body.model_mappings {
        state.store.update_model_mappings(&id, mappings).await?;
    }
    if let Some(extension) = &body.extension {
        state.store.update_extension(&id, extension).await?;
    }
    let account = state.store.get(&id).await?.ok_or(RelayError::NoEligibleAccount)?;
    Ok(Json(account.into()))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, RelayError> {
    if state.store.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, RelayError> {
    let account = state.store.get(&id).await?.ok_or(RelayError::NoEligibleAccount)?;
    state.tokens.force_refresh(&account).await?;
    Ok(Json(RefreshResponse { ok: true }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub error_streak: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatsResponse>, RelayError> {
    let account = state.store.get(&id).await?.ok_or(RelayError::NoEligibleAccount)?;
    Ok(Json(StatsResponse {
        request_count: account.request_count,
        success_count: account.success_count,
        error_count: account.error_count,
        error_streak: account.error_streak,
        cooldown_until: account.cooldown_until,
        last_used_at: account.last_used_at,
    }))
}
