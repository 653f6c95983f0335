//! Per-channel refresh-token grant protocols (§4.2, §6 upstream contracts).

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::db::{Account, ChannelType};
use crate::error::OauthError;

pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

const AMAZONQ_TOKEN_ENDPOINT: &str = "https://oidc.us-east-1.amazonaws.com/token";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refreshes `account`'s access token against its channel's identity
/// provider. `custom_api` accounts carry a static key in `refresh_token`
/// and never hit the network (§3: not every channel has token rotation).
pub async fn refresh(client: &reqwest::Client, account: &Account) -> Result<RefreshedToken, OauthError> {
    match account.channel {
        ChannelType::AmazonQ => refresh_oidc(client, AMAZONQ_TOKEN_ENDPOINT, account).await,
        ChannelType::Gemini => refresh_oidc(client, GOOGLE_TOKEN_ENDPOINT, account).await,
        ChannelType::CustomApi => Ok(RefreshedToken {
            access_token: account.refresh_token.clone(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::days(365),
        }),
    }
}

async fn refresh_oidc(
    client: &reqwest::Client,
    endpoint: &str,
    account: &Account,
) -> Result<RefreshedToken, OauthError> {
    let body = serde_json::json!({
        "grant_type": "refresh_token",
        "refresh_token": account.refresh_token,
        "client_id": account.client_id,
        "client_secret": account.client_secret,
    });

    let response = client
        .post(endpoint)
        .json(&body)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await?;

    if !response.status().is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(OauthError::Refresh(detail));
    }

    let parsed: TokenResponse = response.json().await?;
    Ok(RefreshedToken {
        access_token: parsed.access_token,
        refresh_token: parsed.refresh_token,
        expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
    })
}
