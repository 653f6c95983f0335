//! C10: token usage accounting backing `GET /v1/usage` (§5).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::models::ChannelType;
use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePeriod {
    Hour,
    Day,
    Week,
    Month,
    All,
}

impl UsagePeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(UsagePeriod::Hour),
            "day" => Some(UsagePeriod::Day),
            "week" => Some(UsagePeriod::Week),
            "month" => Some(UsagePeriod::Month),
            "all" => Some(UsagePeriod::All),
            _ => None,
        }
    }

    fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            UsagePeriod::Hour => Some(now - Duration::hours(1)),
            UsagePeriod::Day => Some(now - Duration::days(1)),
            UsagePeriod::Week => Some(now - Duration::weeks(1)),
            UsagePeriod::Month => Some(now - Duration::days(30)),
            UsagePeriod::All => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub model: String,
    pub channel: String,
    pub account_id: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct UsageSummaryRow {
    pub model: String,
    pub channel: String,
    pub request_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
}

#[derive(Clone)]
pub struct UsageTracker {
    pool: SqlitePool,
}

impl UsageTracker {
    pub fn new(pool: SqlitePool) -> Self {
        UsageTracker { pool }
    }

    pub async fn record(&self, account_id: Option<&str>, channel: ChannelType, record: &UsageRecord) -> Result<(), RelayError> {
        sqlx::query(
            r"INSERT INTO usage
                (ts, model, channel, account_id, input_tokens, output_tokens,
                 cache_creation_tokens, cache_read_tokens)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Utc::now())
        .bind(&record.model)
        .bind(channel.as_str())
        .bind(account_id)
        .bind(record.input_tokens)
        .bind(record.output_tokens)
        .bind(record.cache_creation_tokens)
        .bind(record.cache_read_tokens)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregates token counts per model+channel over `period`.
    pub async fn get_summary(&self, period: UsagePeriod) -> Result<Vec<UsageSummaryRow>, RelayError> {
        let since = period.since(Utc::now());
        let rows = match since {
            Some(since) => {
                sqlx::query_as::<_, UsageSummaryRow>(
                    r"SELECT model, channel, COUNT(*) as request_count,
                        COALESCE(SUM(input_tokens), 0) as input_tokens,
                        COALESCE(SUM(output_tokens), 0) as output_tokens,
                        COALESCE(SUM(cache_creation_tokens), 0) as cache_creation_tokens,
                        COALESCE(SUM(cache_read_tokens), 0) as cache_read_tokens
                      FROM usage WHERE ts >= ? GROUP BY model, channel ORDER BY model ASC",
                )
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, UsageSummaryRow>(
                    r"SELECT model, channel, COUNT(*) as request_count,
                        COALESCE(SUM(input_tokens), 0) as input_tokens,
                        COALESCE(SUM(output_tokens), 0) as output_tokens,
                        COALESCE(SUM(cache_creation_tokens), 0) as cache_creation_tokens,
                        COALESCE(SUM(cache_read_tokens), 0) as cache_read_tokens
                      FROM usage GROUP BY model, channel ORDER BY model ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
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
    async fn get_summary_aggregates_by_model_and_channel() {
        let pool = memory_pool().await;
        let tracker = UsageTracker::new(pool);
        let record = UsageRecord {
            model: "claude-opus-4".into(),
            channel: "gemini".into(),
            account_id: Some("acct-1".into()),
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        };
        tracker
            .record(Some("acct-1"), ChannelType::Gemini, &record)
            .await
            .unwrap();
        tracker
            .record(Some("acct-1"), ChannelType::Gemini, &record)
            .await
            .unwrap();

        let summary = tracker.get_summary(UsagePeriod::All).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].request_count, 2);
        assert_eq!(summary[0].input_tokens, 200);
    }

    #[test]
    fn parse_rejects_unknown_period() {
        assert!(UsagePeriod::parse("fortnight").is_none());
        assert_eq!(UsagePeriod::parse("day"), Some(UsagePeriod::Day));
    }
}
