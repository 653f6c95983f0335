//! `POST /v1/messages` (and its Gemini-facing alias) plus
//! `POST /v1/messages/count_tokens` (§4.11, §6).

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use relaymux_schema::claude::ClaudeMessagesRequest;
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::CONFIG;
use crate::error::RelayError;
use crate::server::AppState;
use crate::tokenizer;

fn pinned_account_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-account-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// §4.11 input-validation knob: warn-only by default, reject when
/// `DISABLE_INPUT_VALIDATION` is unset and the estimate exceeds the
/// configured ceiling.
fn validate_input_size(request: &ClaudeMessagesRequest) -> Result<(), RelayError> {
    let estimated = tokenizer::estimate_input_tokens(request);
    if estimated <= CONFIG.amazonq_max_input_tokens {
        return Ok(());
    }
    if CONFIG.disable_input_validation {
        tracing::warn!(estimated, limit = CONFIG.amazonq_max_input_tokens, "input size exceeds configured limit");
        return Ok(());
    }
    Err(RelayError::InvalidRequest(format!(
        "estimated input tokens {estimated} exceeds the configured limit of {}",
        CONFIG.amazonq_max_input_tokens
    )))
}

fn validate_streaming(request: &ClaudeMessagesRequest) -> Result<(), RelayError> {
    if request.stream == Some(true) {
        Ok(())
    } else {
        Err(RelayError::InvalidRequest(
            "only stream: true is supported".to_string(),
        ))
    }
}

async fn dispatch_sse(
    state: AppState,
    headers: HeaderMap,
    request: ClaudeMessagesRequest,
) -> Result<impl IntoResponse, RelayError> {
    validate_streaming(&request)?;
    validate_input_size(&request)?;

    let receiver = state.orchestrator.dispatch(request, pinned_account_id(&headers)).await?;
    let stream = ReceiverStream::new(receiver).map(|event| -> Result<Event, Infallible> {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event(event.event_name()).data(data))
    });
    Ok(Sse::new(stream))
}

/// `POST /v1/messages` — the sole Claude-compatible entry point (§6).
pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ClaudeMessagesRequest>,
) -> impl IntoResponse {
    match dispatch_sse(state, headers, request).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_response(),
    }
}

/// `POST /v1/gemini/messages` — optional alias (§4.11 "(optional)"); same
/// Claude Messages contract, same dispatch path. A dedicated Gemini-shaped
/// request/response surface is out of scope (spec.md Non-goals exclude the
/// management surface beyond §6's contracts; this mirrors `/v1/messages`
/// rather than inventing a second wire format).
pub async fn gemini_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ClaudeMessagesRequest>,
) -> impl IntoResponse {
    match dispatch_sse(state, headers, request).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct CountTokensResponse {
    input_tokens: u32,
}

/// `POST /v1/messages/count_tokens` (§6).
pub async fn count_tokens(Json(request): Json<ClaudeMessagesRequest>) -> impl IntoResponse {
    Json(CountTokensResponse {
        input_tokens: tokenizer::estimate_input_tokens(&request),
    })
}
