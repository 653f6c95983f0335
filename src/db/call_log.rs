//! C3: sliding-window call log backing each account's `rate_limit_per_hour`
//! (§4.3 "eligibility excludes accounts that have already made
//! `rate_limit_per_hour` calls in the trailing 3600 seconds").

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::RelayError;

#[derive(Clone)]
pub struct CallLogRecorder {
    pool: SqlitePool,
}

impl CallLogRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        CallLogRecorder { pool }
    }

    pub async fn record(&self, account_id: &str, model: &str) -> Result<(), RelayError> {
        sqlx::query("INSERT INTO call_logs (account_id, ts, model) VALUES (?, ?, ?)")
            .bind(account_id)
            .bind(Utc::now())
            .bind(model)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of calls for `account_id` within the trailing `window_seconds`.
    pub async fn count_in_window(&self, account_id: &str, window_seconds: i64) -> Result<u32, RelayError> {
        let since = Utc::now() - Duration::seconds(window_seconds);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM call_logs WHERE account_id = ? AND ts >= ?",
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    /// Prunes entries older than `window_seconds`, keeping the table from
    /// growing without bound. Called opportunistically, not on a schedule.
    pub async fn prune_older_than(&self, window_seconds: i64) -> Result<u64, RelayError> {
        let cutoff = Utc::now() - Duration::seconds(window_seconds);
        let result = sqlx::query("DELETE FROM call_logs WHERE ts < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(crate::db::schema::SQLITE_INIT)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn count_in_window_reflects_recent_calls_only() {
        let pool = memory_pool().await;
        let recorder = CallLogRecorder::new(pool.clone());
        recorder.record("acct-1", "claude-opus-4").await.unwrap();
        recorder.record("acct-1", "claude-opus-4").await.unwrap();
        assert_eq!(recorder.count_in_window("acct-1", 3600).await.unwrap(), 2);
        assert_eq!(recorder.count_in_window("acct-2", 3600).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prune_older_than_removes_stale_rows() {
        let pool = memory_pool().await;
        sqlx::query("INSERT INTO call_logs (account_id, ts, model) VALUES ('acct-1', '2000-01-01T00:00:00Z', 'm')")
            .execute(&pool)
            .await
            .unwrap();
        let recorder = CallLogRecorder::new(pool);
        let pruned = recorder.prune_older_than(3600).await.unwrap();
        assert_eq!(pruned, 1);
    }
}
