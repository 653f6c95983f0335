//! C6: request router. Classifies an incoming request into `(channel,
//! account)`, then applies the chosen account's `model_mappings`.

use rand::Rng;
use relaymux_schema::claude::ClaudeMessagesRequest;

use crate::db::{Account, ChannelType};
use crate::error::RelayError;
use crate::pool::AccountPool;

const CHANNELS: [ChannelType; 3] = [ChannelType::AmazonQ, ChannelType::Gemini, ChannelType::CustomApi];

pub struct RoutedRequest {
    pub account: Account,
    pub channel: ChannelType,
    pub target_model: String,
}

/// Routes a request, honoring an optional `X-Account-ID` pin (§4.6, §6).
pub async fn route(
    pool: &AccountPool,
    request: &ClaudeMessagesRequest,
    pinned_account_id: Option<&str>,
) -> Result<RoutedRequest, RelayError> {
    let account = match pinned_account_id {
        Some(id) => pool.select_pinned(id, &request.model).await?,
        None => {
            let channel = pick_channel(pool, &request.model).await?;
            pool.select(channel, &request.model).await?
        }
    };
    let target_model = account.map_model(&request.model);
    let channel = account.channel;
    Ok(RoutedRequest {
        account,
        channel,
        target_model,
    })
}

/// §4.6: pick a channel weighted by its eligible-account count, then let
/// `AccountPool::select` apply the configured strategy within that channel.
async fn pick_channel(pool: &AccountPool, requested_model: &str) -> Result<ChannelType, RelayError> {
    let mut weights = Vec::with_capacity(CHANNELS.len());
    let mut total = 0usize;
    for channel in CHANNELS {
        let count = pool.eligible_count(channel, requested_model).await?;
        total += count;
        weights.push((channel, count));
    }
    if total == 0 {
        return Err(RelayError::NoEligibleAccount);
    }
    let mut point = rand::rng().random_range(0..total);
    for (channel, count) in weights {
        if point < count {
            return Ok(channel);
        }
        point -= count;
    }
    unreachable!("weights must sum to total")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CallLogRecorder, CredentialStore, Extension};
    use chrono::Utc;

    fn account(id: &str, channel: ChannelType) -> Account {
        let now = Utc::now();
        Account {
            id: id.into(),
            channel,
            label: id.into(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            access_token: None,
            token_expires_at: None,
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
        }
    }

    fn sample_request() -> ClaudeMessagesRequest {
        ClaudeMessagesRequest {
            model: "claude-opus-4".into(),
            messages: Vec::new(),
            system: None,
            max_tokens: 1024,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: Some(true),
            context_management: None,
            betas: None,
            anthropic_beta: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn route_with_no_accounts_fails() {
        let store = CredentialStore::connect_memory().await.unwrap();
        let call_log = CallLogRecorder::new(store.pool().clone());
        let pool = AccountPool::new(store, call_log);
        let err = route(&pool, &sample_request(), None).await.unwrap_err();
        assert!(matches!(err, RelayError::NoEligibleAccount));
    }

    #[tokio::test]
    async fn route_applies_model_mapping() {
        let store = CredentialStore::connect_memory().await.unwrap();
        let mut acct = account("acct-1", ChannelType::Gemini);
        acct.model_mappings.push(crate::db::ModelMapping {
            from: "claude-opus-4".into(),
            to: "gemini-2.5-pro".into(),
        });
        store.create(&acct).await.unwrap();
        let call_log = CallLogRecorder::new(store.pool().clone());
        let pool = AccountPool::new(store, call_log);

        let routed = route(&pool, &sample_request(), None).await.unwrap();
        assert_eq!(routed.target_model, "gemini-2.5-pro");
        assert_eq!(routed.channel, ChannelType::Gemini);
    }

    #[tokio::test]
    async fn pinned_account_bypasses_weighted_selection() {
        let store = CredentialStore::connect_memory().await.unwrap();
        store.create(&account("acct-1", ChannelType::AmazonQ)).await.unwrap();
        store.create(&account("acct-2", ChannelType::Gemini)).await.unwrap();
        let call_log = CallLogRecorder::new(store.pool().clone());
        let pool = AccountPool::new(store, call_log);

        let routed = route(&pool, &sample_request(), Some("acct-2")).await.unwrap();
        assert_eq!(routed.account.id, "acct-2");
        assert_eq!(routed.channel, ChannelType::Gemini);
    }
}
