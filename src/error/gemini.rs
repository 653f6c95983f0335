//! Gemini upstream error body (§4.9 "Gemini-specific: distinguish per-minute
//! rate from quota exhausted for the day"), grounded on the teacher's
//! `error/gemini.rs` `quota_reset_delay`.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_RATE_LIMIT_SECONDS: u64 = 90;
const CAPACITY_EXHAUSTED_SECONDS: i64 = 60 * 60;

#[derive(Debug, Deserialize)]
pub struct GeminiErrorBody {
    pub error: GeminiErrorObject,
}

#[derive(Debug, Deserialize)]
pub struct GeminiErrorObject {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub details: Option<Vec<Value>>,
}

/// What a Gemini 429 means for retry/quota bookkeeping.
pub enum GeminiRateLimit {
    /// A short, per-minute burst: cool the account down briefly and retry.
    PerMinute { retry_after_seconds: u64 },
    /// The model's allotment is gone until `reset_at`: mark it exhausted
    /// rather than just cooling the account down.
    QuotaExhausted { reset_at: DateTime<Utc> },
}

impl GeminiErrorBody {
    /// Mirrors the teacher's `quota_reset_delay`: a `quotaResetTimeStamp` in
    /// the error details gives an exact reset time; a `MODEL_CAPACITY_EXHAUSTED`
    /// reason with no timestamp still means a real outage, not a blip.
    fn quota_reset_at(&self) -> Option<DateTime<Utc>> {
        let details = self.error.details.as_ref()?;
        details
            .iter()
            .filter_map(|detail| {
                detail
                    .get("metadata")
                    .and_then(|m| m.get("quotaResetTimeStamp"))
                    .and_then(Value::as_str)
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            })
            .map(|dt| dt.with_timezone(&Utc))
            .next()
    }

    fn capacity_exhausted(&self) -> bool {
        self.error.details.as_ref().is_some_and(|details| {
            details
                .iter()
                .any(|d| d.get("reason").and_then(Value::as_str) == Some("MODEL_CAPACITY_EXHAUSTED"))
        })
    }

    /// Classifies a 429. Only `status: "RESOURCE_EXHAUSTED"` carries quota
    /// information at all; anything else falls back to a plain per-minute
    /// cooldown, same as the teacher's unmatched-rule fallback. Within
    /// `RESOURCE_EXHAUSTED`, a server-supplied reset point (explicit
    /// timestamp, or the capacity-exhausted reason) counts as the daily
    /// quota running out; a bare `RESOURCE_EXHAUSTED` with neither is an
    /// ordinary per-minute burst.
    pub fn classify(&self, now: DateTime<Utc>) -> GeminiRateLimit {
        if self.error.status.as_deref() != Some("RESOURCE_EXHAUSTED") {
            return GeminiRateLimit::PerMinute {
                retry_after_seconds: DEFAULT_RATE_LIMIT_SECONDS,
            };
        }
        if let Some(reset_at) = self.quota_reset_at() {
            return GeminiRateLimit::QuotaExhausted { reset_at };
        }
        if self.capacity_exhausted() {
            return GeminiRateLimit::QuotaExhausted {
                reset_at: now + Duration::seconds(CAPACITY_EXHAUSTED_SECONDS),
            };
        }
        GeminiRateLimit::PerMinute {
            retry_after_seconds: DEFAULT_RATE_LIMIT_SECONDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_reset_timestamp_classifies_as_exhausted() {
        let now = Utc::now();
        let reset = now + Duration::seconds(3600);
        let body: GeminiErrorBody = serde_json::from_value(serde_json::json!({
            "error": {
                "code": 429,
                "status": "RESOURCE_EXHAUSTED",
                "details": [{
                    "metadata": {"quotaResetTimeStamp": reset.to_rfc3339()}
                }]
            }
        }))
        .unwrap();
        assert!(matches!(body.classify(now), GeminiRateLimit::QuotaExhausted { .. }));
    }

    #[test]
    fn capacity_exhausted_reason_without_timestamp_classifies_as_exhausted() {
        let now = Utc::now();
        let body: GeminiErrorBody = serde_json::from_value(serde_json::json!({
            "error": {
                "status": "RESOURCE_EXHAUSTED",
                "details": [{"reason": "MODEL_CAPACITY_EXHAUSTED"}]
            }
        }))
        .unwrap();
        assert!(matches!(body.classify(now), GeminiRateLimit::QuotaExhausted { .. }));
    }

    #[test]
    fn bare_resource_exhausted_classifies_as_per_minute() {
        let now = Utc::now();
        let body: GeminiErrorBody = serde_json::from_value(serde_json::json!({
            "error": {"status": "RESOURCE_EXHAUSTED"}
        }))
        .unwrap();
        assert!(matches!(body.classify(now), GeminiRateLimit::PerMinute { .. }));
    }
}
