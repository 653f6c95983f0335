//! C4: account pool and selector. Wraps the credential store with
//! eligibility filtering (enabled, cooldown/circuit-breaker, rate-limit
//! window) and the configured load-balancing strategy.

mod strategy;

pub use strategy::Strategy;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::config::CONFIG;
use crate::db::{Account, CallLogRecorder, ChannelType, CredentialStore};
use crate::error::RelayError;

const RATE_LIMIT_WINDOW_SECONDS: i64 = 3600;

#[derive(Clone)]
pub struct AccountPool {
    store: CredentialStore,
    call_log: CallLogRecorder,
    cursors: std::sync::Arc<Mutex<HashMap<ChannelType, u64>>>,
}

impl AccountPool {
    pub fn new(store: CredentialStore, call_log: CallLogRecorder) -> Self {
        AccountPool {
            store,
            call_log,
            cursors: std::sync::Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Filters `channel`'s accounts down to those eligible right now:
    /// enabled, past their cooldown, under their hourly call budget, and (for
    /// Gemini) not out of quota for `requested_model` (§4.4).
    async fn eligible_candidates(
        &self,
        channel: ChannelType,
        requested_model: &str,
    ) -> Result<Vec<Account>, RelayError> {
        let accounts = self.store.list_by_channel(channel).await?;
        let now = Utc::now();
        let mut eligible = Vec::with_capacity(accounts.len());
        for account in accounts {
            if !account.is_eligible(now) {
                continue;
            }
            if !self.model_eligible(&account, requested_model, now) {
                continue;
            }
            let used = self
                .call_log
                .count_in_window(&account.id, RATE_LIMIT_WINDOW_SECONDS)
                .await?;
            if used >= account.rate_limit_per_hour {
                continue;
            }
            eligible.push(account);
        }
        Ok(eligible)
    }

    /// §4.4 "by model (for Gemini, account's per-model quota ...)". Other
    /// channels carry no such quota, so this is a no-op for them.
    fn model_eligible(&self, account: &Account, requested_model: &str, now: chrono::DateTime<Utc>) -> bool {
        if account.channel != ChannelType::Gemini {
            return true;
        }
        let target_model = account.map_model(requested_model);
        account.extension.gemini_model_eligible(&target_model, now)
    }

    /// Number of accounts of `channel` currently eligible, used by C6 to
    /// weight the channel-selection step (§4.6).
    pub async fn eligible_count(&self, channel: ChannelType, requested_model: &str) -> Result<usize, RelayError> {
        Ok(self.eligible_candidates(channel, requested_model).await?.len())
    }

    /// Selects an eligible account for `channel` using the configured
    /// strategy. Returns `RelayError::NoEligibleAccount` when the channel
    /// has nothing usable right now (§7).
    pub async fn select(&self, channel: ChannelType, requested_model: &str) -> Result<Account, RelayError> {
        let candidates = self.eligible_candidates(channel, requested_model).await?;
        if candidates.is_empty() {
            return Err(RelayError::NoEligibleAccount);
        }
        let strategy = Strategy::from(CONFIG.load_balance_strategy);
        let cursor = self.next_cursor(channel);
        let idx = strategy::select(strategy, &candidates, cursor).ok_or(RelayError::NoEligibleAccount)?;
        Ok(candidates.into_iter().nth(idx).expect("index in bounds"))
    }

    /// §6 `X-Account-ID` pinning: bypasses weighted selection but still
    /// requires the account to be enabled and respects the model quota
    /// filter (§9 decision on the `X-Account-ID` bypass).
    pub async fn select_pinned(&self, account_id: &str, requested_model: &str) -> Result<Account, RelayError> {
        let account = self
            .store
            .get(account_id)
            .await?
            .ok_or(RelayError::NoEligibleAccount)?;
        if !account.enabled {
            return Err(RelayError::NoEligibleAccount);
        }
        if !self.model_eligible(&account, requested_model, Utc::now()) {
            return Err(RelayError::NoEligibleAccount);
        }
        Ok(account)
    }

    fn next_cursor(&self, channel: ChannelType) -> u64 {
        let mut cursors = self.cursors.lock().expect("cursor lock poisoned");
        let entry = cursors.entry(channel).or_insert(0);
        let current = *entry;
        *entry = entry.wrapping_add(1);
        current
    }

    pub async fn record_success(&self, account: &Account, model: &str) -> Result<(), RelayError> {
        self.store.record_success(&account.id).await?;
        self.call_log.record(&account.id, model).await?;
        Ok(())
    }

    /// §4.4 circuit breaker: a 429 force-opens the breaker immediately;
    /// otherwise the streak only opens it once it crosses the threshold.
    pub async fn record_failure(&self, account: &Account, is_rate_limited: bool) -> Result<(), RelayError> {
        if is_rate_limited {
            let until = Utc::now() + Duration::seconds(CONFIG.circuit_breaker_recovery_timeout as i64);
            return self.store.record_error(&account.id, Some(until)).await;
        }
        if !CONFIG.circuit_breaker_enabled {
            return self.store.record_error(&account.id, None).await;
        }
        let next_streak = account.error_streak + 1;
        let cooldown = if next_streak >= CONFIG.circuit_breaker_error_threshold {
            Some(Utc::now() + Duration::seconds(CONFIG.circuit_breaker_recovery_timeout as i64))
        } else {
            None
        };
        self.store.record_error(&account.id, cooldown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Extension;

    async fn test_pool() -> AccountPool {
        let store = CredentialStore::connect_memory().await.unwrap();
        let call_log = CallLogRecorder::new(store.pool().clone());
        AccountPool::new(store, call_log)
    }

    fn account(id: &str, channel: ChannelType, enabled: bool) -> Account {
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
            enabled,
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

    #[tokio::test]
    async fn select_errors_when_no_accounts() {
        let pool = test_pool().await;
        let err = pool.select(ChannelType::Gemini, "claude-opus-4").await.unwrap_err();
        assert!(matches!(err, RelayError::NoEligibleAccount));
    }

    #[tokio::test]
    async fn select_skips_disabled_accounts() {
        let pool = test_pool().await;
        pool.store
            .create(&account("acct-1", ChannelType::Gemini, false))
            .await
            .unwrap();
        let err = pool.select(ChannelType::Gemini, "claude-opus-4").await.unwrap_err();
        assert!(matches!(err, RelayError::NoEligibleAccount));
    }

    #[tokio::test]
    async fn select_skips_gemini_account_out_of_quota_for_model() {
        let pool = test_pool().await;
        let mut acct = account("acct-1", ChannelType::Gemini, true);
        acct.extension.gemini_model_quota.insert(
            "gemini-2.5-pro".into(),
            crate::db::GeminiModelQuota {
                remaining: 0,
                reset_at: Some(Utc::now() + Duration::seconds(300)),
            },
        );
        pool.store.create(&acct).await.unwrap();
        let err = pool.select(ChannelType::Gemini, "gemini-2.5-pro").await.unwrap_err();
        assert!(matches!(err, RelayError::NoEligibleAccount));
    }

    #[tokio::test]
    async fn record_failure_opens_breaker_at_threshold() {
        let pool = test_pool().await;
        let mut acct = account("acct-1", ChannelType::Gemini, true);
        acct.error_streak = CONFIG.circuit_breaker_error_threshold - 1;
        pool.store.create(&acct).await.unwrap();
        pool.record_failure(&acct, false).await.unwrap();
        let refreshed = pool.store.get("acct-1").await.unwrap().unwrap();
        assert!(refreshed.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn record_failure_force_opens_on_rate_limit() {
        let pool = test_pool().await;
        let acct = account("acct-1", ChannelType::Gemini, true);
        pool.store.create(&acct).await.unwrap();
        pool.record_failure(&acct, true).await.unwrap();
        let refreshed = pool.store.get("acct-1").await.unwrap().unwrap();
        assert!(refreshed.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn select_pinned_requires_enabled() {
        let pool = test_pool().await;
        pool.store
            .create(&account("acct-1", ChannelType::Gemini, false))
            .await
            .unwrap();
        let err = pool.select_pinned("acct-1", "claude-opus-4").await.unwrap_err();
        assert!(matches!(err, RelayError::NoEligibleAccount));
    }
}
