//! Account persistence (C1). Plain `sqlx::query`/`query_as` against a
//! `SqlitePool` — no `query!` macros, since those need a live database at
//! compile time.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use super::models::{Account, ChannelType, Extension, ModelMapping};
use crate::error::RelayError;

/// A row in the `admins` table (§6 "one table `admins` (bcrypt-hashed
/// credentials)"). Bootstrapping the first admin row is out-of-band — the
/// distilled spec excludes "management CRUD endpoints beyond the contracts
/// §6 lists", and §6 only lists the login endpoint, not account creation.
#[derive(Debug, Clone, FromRow)]
pub struct AdminRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub async fn connect(database_url: &str) -> Result<Self, RelayError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        sqlx::query(super::schema::SQLITE_INIT).execute(&pool).await?;
        Ok(CredentialStore { pool })
    }

    #[cfg(test)]
    pub async fn connect_memory() -> Result<Self, RelayError> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, RelayError> {
        let rows = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_by_channel(&self, channel: ChannelType) -> Result<Vec<Account>, RelayError> {
        let rows = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE channel = ?")
            .bind(channel.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Account>, RelayError> {
        let row = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, account: &Account) -> Result<(), RelayError> {
        let extension_json = serde_json::to_string(&account.extension)?;
        let mappings_json = serde_json::to_string(&account.model_mappings)?;
        sqlx::query(
            r"INSERT INTO accounts
                (id, channel, label, client_id, client_secret, refresh_token, access_token,
                 token_expires_at, extension, model_mappings, enabled, weight,
                 rate_limit_per_hour, cooldown_until, last_used_at, request_count,
                 success_count, error_count, error_streak, last_refresh_status,
                 last_refresh_at, created_at, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(account.channel.as_str())
        .bind(&account.label)
        .bind(&account.client_id)
        .bind(&account.client_secret)
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.token_expires_at)
        .bind(extension_json)
        .bind(mappings_json)
        .bind(account.enabled)
        .bind(i64::from(account.weight))
        .bind(i64::from(account.rate_limit_per_hour))
        .bind(account.cooldown_until)
        .bind(account.last_used_at)
        .bind(account.request_count as i64)
        .bind(account.success_count as i64)
        .bind(account.error_count as i64)
        .bind(i64::from(account.error_streak))
        .bind(&account.last_refresh_status)
        .bind(account.last_refresh_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, RelayError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), RelayError> {
        sqlx::query("UPDATE accounts SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_weight(&self, id: &str, weight: u32) -> Result<(), RelayError> {
        sqlx::query("UPDATE accounts SET weight = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(weight))
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_model_mappings(
        &self,
        id: &str,
        mappings: &[ModelMapping],
    ) -> Result<(), RelayError> {
        let json = serde_json::to_string(mappings)?;
        sqlx::query("UPDATE accounts SET model_mappings = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_extension(&self, id: &str, extension: &Extension) -> Result<(), RelayError> {
        let json = serde_json::to_string(extension)?;
        sqlx::query("UPDATE accounts SET extension = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persists a fresh access token after a successful refresh (C2).
    pub async fn update_token(
        &self,
        id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let now = Utc::now();
        sqlx::query(
            r"UPDATE accounts SET access_token = ?, token_expires_at = ?,
              last_refresh_status = 'ok', last_refresh_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(access_token)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_refresh_status(&self, id: &str, status: &str) -> Result<(), RelayError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE accounts SET last_refresh_status = ?, last_refresh_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.4 circuit breaker: bumps `error_streak` and, once it crosses the
    /// configured threshold (or immediately on a 429), opens the breaker by
    /// setting `cooldown_until`.
    pub async fn record_error(
        &self,
        id: &str,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<(), RelayError> {
        let now = Utc::now();
        sqlx::query(
            r"UPDATE accounts SET error_count = error_count + 1, error_streak = error_streak + 1,
              request_count = request_count + 1, cooldown_until = COALESCE(?, cooldown_until),
              last_used_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(cooldown_until)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_success(&self, id: &str) -> Result<(), RelayError> {
        let now = Utc::now();
        sqlx::query(
            r"UPDATE accounts SET success_count = success_count + 1, error_streak = 0,
              request_count = request_count + 1, last_used_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_cooldown(
        &self,
        id: &str,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<(), RelayError> {
        sqlx::query("UPDATE accounts SET cooldown_until = ?, updated_at = ? WHERE id = ?")
            .bind(cooldown_until)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminRow>, RelayError> {
        let row = sqlx::query_as::<_, AdminRow>("SELECT * FROM admins WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn create_admin(&self, username: &str, password_hash: &str) -> Result<(), RelayError> {
        sqlx::query("INSERT INTO admins (username, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account(id: &str) -> Account {
        let now = Utc::now();
        Account {
            id: id.to_string(),
            channel: ChannelType::Gemini,
            label: "test account".into(),
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "rtok".into(),
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

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = CredentialStore::connect_memory().await.unwrap();
        let account = sample_account("acct-1");
        store.create(&account).await.unwrap();
        let fetched = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "acct-1");
        assert_eq!(fetched.channel, ChannelType::Gemini);
    }

    #[tokio::test]
    async fn record_error_sets_cooldown_and_increments_streak() {
        let store = CredentialStore::connect_memory().await.unwrap();
        let account = sample_account("acct-1");
        store.create(&account).await.unwrap();
        let until = Utc::now() + chrono::Duration::seconds(300);
        store.record_error("acct-1", Some(until)).await.unwrap();
        let fetched = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(fetched.error_streak, 1);
        assert!(fetched.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn record_success_resets_error_streak() {
        let store = CredentialStore::connect_memory().await.unwrap();
        let account = sample_account("acct-1");
        store.create(&account).await.unwrap();
        store.record_error("acct-1", None).await.unwrap();
        store.record_success("acct-1").await.unwrap();
        let fetched = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(fetched.error_streak, 0);
        assert_eq!(fetched.success_count, 1);
    }

    #[tokio::test]
    async fn delete_removes_account() {
        let store = CredentialStore::connect_memory().await.unwrap();
        store.create(&sample_account("acct-1")).await.unwrap();
        assert!(store.delete("acct-1").await.unwrap());
        assert!(store.get("acct-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_round_trips_by_username() {
        let store = CredentialStore::connect_memory().await.unwrap();
        assert!(store.get_admin_by_username("root").await.unwrap().is_none());
        store.create_admin("root", "hashed").await.unwrap();
        let admin = store.get_admin_by_username("root").await.unwrap().unwrap();
        assert_eq!(admin.password_hash, "hashed");
    }
}
