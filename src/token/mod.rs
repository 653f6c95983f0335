//! C2: token lifecycle. `get_valid_token` guarantees ≥5 minutes of
//! remaining life, refreshing through a per-account mutex so concurrent
//! callers for the same account coalesce onto one refresh.

mod device_code;
mod refresh;

pub use device_code::{AuthSession, AuthSessionRegistry, AuthStatus, CompletedDeviceAuth};

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::db::{Account, CredentialStore};
use crate::error::{OauthError, RelayError};

const EXPIRY_MARGIN_SECONDS: i64 = 300;

#[derive(Clone)]
pub struct TokenManager {
    store: CredentialStore,
    client: reqwest::Client,
    locks: Arc<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TokenManager {
    pub fn new(store: CredentialStore, client: reqwest::Client) -> Self {
        TokenManager {
            store,
            client,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    fn lock_for(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("token lock map poisoned");
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn is_expired(account: &Account) -> bool {
        match (&account.access_token, account.token_expires_at) {
            (Some(_), Some(expires_at)) => {
                expires_at - Utc::now() < Duration::seconds(EXPIRY_MARGIN_SECONDS)
            }
            _ => true,
        }
    }

    /// Returns a token guaranteed to have at least 5 minutes of life left,
    /// refreshing `account` first if necessary. On provider rejection the
    /// account is marked `last_refresh_status=failed` and the error bubbles
    /// as `RelayError::Token`.
    pub async fn get_valid_token(&self, account: &Account) -> Result<String, RelayError> {
        if !Self::is_expired(account) {
            return Ok(account
                .access_token
                .clone()
                .expect("non-expired account always has a token"));
        }

        let lock = self.lock_for(&account.id);
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: a concurrent caller may have
        // already refreshed this account while we were waiting.
        let current = self
            .store
            .get(&account.id)
            .await?
            .unwrap_or_else(|| account.clone());
        if !Self::is_expired(&current) {
            return Ok(current.access_token.expect("just checked non-expired"));
        }

        match refresh::refresh(&self.client, &current).await {
            Ok(refreshed) => {
                self.store
                    .update_token(&current.id, &refreshed.access_token, refreshed.expires_at)
                    .await?;
                Ok(refreshed.access_token)
            }
            Err(err) => {
                self.store.update_refresh_status(&current.id, "failed").await?;
                Err(RelayError::Token(err))
            }
        }
    }

    /// Unconditional refresh, bypassing the expiry check `get_valid_token`
    /// applies — backs the admin `/v2/accounts/{id}/refresh` endpoint.
    pub async fn force_refresh(&self, account: &Account) -> Result<String, RelayError> {
        let lock = self.lock_for(&account.id);
        let _guard = lock.lock().await;
        match refresh::refresh(&self.client, account).await {
            Ok(refreshed) => {
                self.store
                    .update_token(&account.id, &refreshed.access_token, refreshed.expires_at)
                    .await?;
                Ok(refreshed.access_token)
            }
            Err(err) => {
                self.store.update_refresh_status(&account.id, "failed").await?;
                Err(RelayError::Token(err))
            }
        }
    }

    /// §4.2 background auto-refresh: proactively refreshes every enabled
    /// account, independent of request traffic. Skips accounts whose
    /// refresh fails rather than aborting the sweep.
    pub async fn refresh_all_enabled(&self) -> Result<(), RelayError> {
        for account in self.store.list_accounts().await? {
            if !account.enabled {
                continue;
            }
            if let Err(err) = self.get_valid_token(&account).await {
                tracing::warn!(account_id = %account.id, error = %err, "background token refresh failed");
            }
        }
        Ok(())
    }

    /// Marks a runtime JWT exp-claim or upstream 401/403 "token invalid"
    /// signal by forcing the next `get_valid_token` call to refresh.
    pub async fn invalidate(&self, account_id: &str) -> Result<(), RelayError> {
        self.store
            .update_refresh_status(account_id, "invalidated")
            .await
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Best-effort inspection of a JWT's `exp` claim without signature
/// verification (§4.2 "runtime JWT exp-claim inspection" is a secondary,
/// redundant signal to the stored `expires_at`).
pub fn jwt_expires_within(token: &str, margin: Duration) -> Option<bool> {
    use base64::Engine as _;
    let payload_b64 = token.split('.').nth(1)?;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    let exp_at = chrono::DateTime::from_timestamp(exp, 0)?;
    Some(exp_at - Utc::now() < margin)
}
