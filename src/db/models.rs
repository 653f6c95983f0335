//! Row types for the `accounts` table (C1) and the small value types an
//! account carries: channel discriminant, extension payload, model mapping
//! table, and the custom-API provider format.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    AmazonQ,
    Gemini,
    CustomApi,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::AmazonQ => "amazon_q",
            ChannelType::Gemini => "gemini",
            ChannelType::CustomApi => "custom_api",
        }
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amazon_q" => Ok(ChannelType::AmazonQ),
            "gemini" => Ok(ChannelType::Gemini),
            "custom_api" => Ok(ChannelType::CustomApi),
            other => Err(format!("unknown channel type: {other}")),
        }
    }
}

/// Wire format a `custom_api` channel speaks upstream (§3 "custom API
/// accounts may be OpenAI- or Claude-compatible").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomApiFormat {
    OpenaiCompatible,
    ClaudeCompatible,
}

/// Channel-specific extras that don't belong on every account row. Stored as
/// a JSON blob the store round-trips but never interprets (mirrors the
/// teacher's `Extension` pattern for provider-specific OAuth metadata).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extension {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_api_format: Option<CustomApiFormat>,
    /// `custom_api`'s `api_base` and Gemini's per-account `endpoint` share
    /// this field — both are "the upstream base URL for this account".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Amazon Q `profile_arn`, forwarded on `AmazonQConversationState` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
    /// `custom_api`'s `provider`: `Some("azure")` triggers the Azure cleanup
    /// pass on Claude-compatible passthrough (§4.7d).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Gemini per-model quota map (§4.4 eligibility filter, §4.9 failover):
    /// keyed by the upstream model name, updated from a 429's error body.
    #[serde(default)]
    pub gemini_model_quota: BTreeMap<String, GeminiModelQuota>,
}

impl Extension {
    pub fn is_azure(&self) -> bool {
        self.provider.as_deref() == Some("azure")
    }

    /// §4.4: "for Gemini, account's per-model quota must show `remaining >
    /// 0` and `reset_at ≤ now OR remaining > 0`" — a model with no recorded
    /// quota is unrestricted; one that's marked exhausted becomes eligible
    /// again once its `remaining` is nonzero or its reset time has passed.
    pub fn gemini_model_eligible(&self, model: &str, now: DateTime<Utc>) -> bool {
        match self.gemini_model_quota.get(model) {
            None => true,
            Some(quota) => quota.remaining > 0 || quota.reset_at.is_some_and(|reset_at| reset_at <= now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMapping {
    pub from: String,
    pub to: String,
}

/// Per-model quota state for Gemini (§4.4 eligibility filter), set by the
/// 429 failover path in the orchestrator (§4.9) when a model's daily
/// allotment runs out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiModelQuota {
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub channel: ChannelType,
    pub label: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
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
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// §4.4 "an account is eligible when enabled and neither cooling down
    /// nor circuit-broken" (cooldown and circuit-breaker share one field).
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.cooldown_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    pub fn map_model(&self, requested: &str) -> String {
        self.model_mappings
            .iter()
            .find(|m| m.from == requested)
            .map(|m| m.to.clone())
            .unwrap_or_else(|| requested.to_string())
    }
}

impl FromRow<'_, SqliteRow> for Account {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let channel_str: String = row.try_get("channel")?;
        let channel = channel_str
            .parse::<ChannelType>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        let extension_json: String = row.try_get("extension")?;
        let extension: Extension = serde_json::from_str(&extension_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let mappings_json: String = row.try_get("model_mappings")?;
        let model_mappings: Vec<ModelMapping> = serde_json::from_str(&mappings_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Account {
            id: row.try_get("id")?,
            channel,
            label: row.try_get("label")?,
            client_id: row.try_get("client_id")?,
            client_secret: row.try_get("client_secret")?,
            refresh_token: row.try_get("refresh_token")?,
            access_token: row.try_get("access_token")?,
            token_expires_at: row.try_get("token_expires_at")?,
            extension,
            model_mappings,
            enabled: row.try_get::<i64, _>("enabled")? != 0,
            weight: row.try_get::<i64, _>("weight")? as u32,
            rate_limit_per_hour: row.try_get::<i64, _>("rate_limit_per_hour")? as u32,
            cooldown_until: row.try_get("cooldown_until")?,
            last_used_at: row.try_get("last_used_at")?,
            request_count: row.try_get::<i64, _>("request_count")? as u64,
            success_count: row.try_get::<i64, _>("success_count")? as u64,
            error_count: row.try_get::<i64, _>("error_count")? as u64,
            error_streak: row.try_get::<i64, _>("error_streak")? as u32,
            last_refresh_status: row.try_get("last_refresh_status")?,
            last_refresh_at: row.try_get("last_refresh_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_round_trips_through_str() {
        for ch in [ChannelType::AmazonQ, ChannelType::Gemini, ChannelType::CustomApi] {
            let parsed: ChannelType = ch.as_str().parse().unwrap();
            assert_eq!(parsed.as_str(), ch.as_str());
        }
    }

    #[test]
    fn gemini_model_eligible_defaults_true_with_no_quota_entry() {
        let ext = Extension::default();
        assert!(ext.gemini_model_eligible("gemini-2.5-pro", Utc::now()));
    }

    #[test]
    fn gemini_model_eligible_false_when_exhausted_and_not_yet_reset() {
        let mut ext = Extension::default();
        let now = Utc::now();
        ext.gemini_model_quota.insert(
            "gemini-2.5-pro".into(),
            GeminiModelQuota {
                remaining: 0,
                reset_at: Some(now + chrono::Duration::seconds(60)),
            },
        );
        assert!(!ext.gemini_model_eligible("gemini-2.5-pro", now));
    }

    #[test]
    fn gemini_model_eligible_true_once_reset_time_has_passed() {
        let mut ext = Extension::default();
        let now = Utc::now();
        ext.gemini_model_quota.insert(
            "gemini-2.5-pro".into(),
            GeminiModelQuota {
                remaining: 0,
                reset_at: Some(now - chrono::Duration::seconds(1)),
            },
        );
        assert!(ext.gemini_model_eligible("gemini-2.5-pro", now));
    }

    #[test]
    fn model_mapping_falls_back_to_requested_name() {
        let mut acct = sample_account();
        assert_eq!(acct.map_model("claude-opus-4"), "claude-opus-4");
        acct.model_mappings.push(ModelMapping {
            from: "claude-opus-4".into(),
            to: "gemini-2.5-pro".into(),
        });
        assert_eq!(acct.map_model("claude-opus-4"), "gemini-2.5-pro");
    }

    fn sample_account() -> Account {
        let now = Utc::now();
        Account {
            id: "acct-1".into(),
            channel: ChannelType::Gemini,
            label: "test".into(),
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
}
