//! Device-authorization flow (§4.2, §6 "Amazon Q OIDC"): register an OIDC
//! client, request a device code, then poll the token endpoint until the
//! user approves, the server says `authorization_pending`, or the 5-minute
//! ceiling is hit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OauthError;

const REGISTER_ENDPOINT: &str = "https://oidc.us-east-1.amazonaws.com/client/register";
const DEVICE_AUTH_ENDPOINT: &str = "https://oidc.us-east-1.amazonaws.com/device_authorization";
const TOKEN_ENDPOINT: &str = "https://oidc.us-east-1.amazonaws.com/token";
const DEVICE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const CEILING_SECONDS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Pending,
    Completed,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub auth_id: String,
    #[serde(skip)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: String,
    #[serde(skip)]
    pub device_code: String,
    pub interval_s: u64,
    pub expires_in_s: u64,
    pub verification_uri: String,
    pub user_code: String,
    #[serde(skip)]
    pub start_time: DateTime<Utc>,
    pub status: AuthStatus,
    pub account_id: Option<String>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "clientSecret")]
    client_secret: String,
}

#[derive(Deserialize)]
struct DeviceAuthResponse {
    #[serde(rename = "deviceCode")]
    device_code: String,
    #[serde(rename = "userCode")]
    user_code: String,
    #[serde(rename = "verificationUriComplete")]
    verification_uri_complete: String,
    #[serde(rename = "expiresIn")]
    expires_in: u64,
    #[serde(default = "default_interval", rename = "interval")]
    interval: u64,
}

fn default_interval() -> u64 {
    5
}

#[derive(Deserialize)]
struct DeviceTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken", default)]
    refresh_token: Option<String>,
}

pub struct CompletedDeviceAuth {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,
}

/// In-memory registry of in-flight device-code sessions. TTL-bounded to the
/// 5-minute ceiling; never persisted (§3 "AuthSession ... in-memory only").
#[derive(Default)]
pub struct AuthSessionRegistry {
    sessions: Mutex<HashMap<String, AuthSession>>,
}

impl AuthSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, client: &reqwest::Client, base_url: &str) -> Result<AuthSession, OauthError> {
        let register: RegisterResponse = client
            .post(REGISTER_ENDPOINT)
            .json(&serde_json::json!({
                "clientName": "relaymux",
                "clientType": "public",
                "scopes": ["codewhisperer:completions"],
                "redirectUris": [format!("{base_url}/v2/auth/callback")],
                "grantTypes": ["authorization_code", "refresh_token", DEVICE_GRANT],
                "issuerUrl": "https://view.awsapps.com/start",
            }))
            .timeout(StdDuration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(OauthError::Http)?
            .json()
            .await?;

        let device_auth: DeviceAuthResponse = client
            .post(DEVICE_AUTH_ENDPOINT)
            .json(&serde_json::json!({
                "clientId": register.client_id,
                "clientSecret": register.client_secret,
                "startUrl": "https://view.awsapps.com/start",
            }))
            .timeout(StdDuration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(OauthError::Http)?
            .json()
            .await?;

        let auth_id = uuid::Uuid::new_v4().to_string();
        let session = AuthSession {
            auth_id: auth_id.clone(),
            client_id: register.client_id,
            client_secret: register.client_secret,
            device_code: device_auth.device_code,
            interval_s: device_auth.interval.max(1),
            expires_in_s: device_auth.expires_in.min(CEILING_SECONDS as u64),
            verification_uri: device_auth.verification_uri_complete,
            user_code: device_auth.user_code,
            start_time: Utc::now(),
            status: AuthStatus::Pending,
            account_id: None,
        };

        self.sessions.lock().expect("lock poisoned").insert(auth_id, session.clone());
        Ok(session)
    }

    pub fn get(&self, auth_id: &str) -> Option<AuthSession> {
        self.sessions.lock().expect("lock poisoned").get(auth_id).cloned()
    }

    fn set_status(&self, auth_id: &str, status: AuthStatus) {
        if let Some(session) = self.sessions.lock().expect("lock poisoned").get_mut(auth_id) {
            session.status = status;
        }
    }

    /// Polls the token endpoint at the server-specified interval until
    /// success, an unrecoverable error, or the 5-minute ceiling.
    pub async fn claim(
        &self,
        client: &reqwest::Client,
        auth_id: &str,
    ) -> Result<CompletedDeviceAuth, OauthError> {
        let session = self
            .get(auth_id)
            .ok_or_else(|| OauthError::Refresh("unknown auth session".into()))?;

        let deadline = session.start_time + chrono::Duration::seconds(CEILING_SECONDS);
        let mut interval = StdDuration::from_secs(session.interval_s);

        loop {
            if Utc::now() >= deadline {
                self.set_status(auth_id, AuthStatus::Timeout);
                return Err(OauthError::Timeout);
            }

            let response = client
                .post(TOKEN_ENDPOINT)
                .json(&serde_json::json!({
                    "grantType": DEVICE_GRANT,
                    "deviceCode": session.device_code,
                    "clientId": session.client_id,
                    "clientSecret": session.client_secret,
                }))
                .timeout(StdDuration::from_secs(30))
                .send()
                .await?;

            if response.status().is_success() {
                let token: DeviceTokenResponse = response.json().await?;
                self.set_status(auth_id, AuthStatus::Completed);
                return Ok(CompletedDeviceAuth {
                    access_token: token.access_token,
                    refresh_token: token.refresh_token,
                    client_id: session.client_id,
                    client_secret: session.client_secret,
                });
            }

            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let error_code = body.get("error").and_then(|v| v.as_str()).unwrap_or_default();
            if error_code != "authorization_pending" && error_code != "slow_down" {
                self.set_status(auth_id, AuthStatus::Error);
                return Err(OauthError::Refresh(error_code.to_string()));
            }
            if error_code == "slow_down" {
                interval += StdDuration::from_secs(5);
            }

            tokio::time::sleep(interval).await;
        }
    }
}
