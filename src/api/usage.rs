//! `GET /v1/usage?period=...` (§4.10, §6).

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::db::{UsagePeriod, UsageSummaryRow};
use crate::error::RelayError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default)]
    period: Option<String>,
}

pub async fn get_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageSummaryRow>>, RelayError> {
    let period = query
        .period
        .as_deref()
        .map(UsagePeriod::parse)
        .unwrap_or(Some(UsagePeriod::Day))
        .ok_or_else(|| RelayError::InvalidRequest("period must be one of hour|day|week|month|all".into()))?;
    let summary = state.usage.get_summary(period).await?;
    Ok(Json(summary))
}
