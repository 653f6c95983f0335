use thiserror::Error as ThisError;

/// Token lifecycle errors (§4.2). `Refresh` covers both the refresh-token
/// grant and the device-code poll; `Timeout` is the 5-minute device-code
/// ceiling (§7 `AuthTimeout` → 408).
#[derive(Debug, ThisError)]
pub enum OauthError {
    #[error("token refresh rejected by identity provider: {0}")]
    Refresh(String),

    #[error("device authorization timed out")]
    Timeout,

    #[error("http error during token exchange: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse token response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl super::IsRetryable for OauthError {
    fn is_retryable(&self) -> bool {
        matches!(self, OauthError::Http(_))
    }
}
