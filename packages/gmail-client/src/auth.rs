//! OAuth token refresh for installed-app and web credentials.
//!
//! Token issuance (the consent flow) belongs to Google; this module only
//! exchanges a stored refresh token for a short-lived access token.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GmailError, Result};

/// Default Google OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth client credentials plus token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl OAuthConfig {
    /// Create a config for the standard Google token endpoint.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Create from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` environment variables.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| GmailError::Config("GOOGLE_CLIENT_ID not set".into()))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| GmailError::Config("GOOGLE_CLIENT_SECRET not set".into()))?;
        Ok(Self::new(client_id, client_secret))
    }

    /// Set a custom token endpoint (for proxies and tests).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in_secs: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize, Default)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Exchange a refresh token for an access token.
///
/// `invalid_grant` means the user revoked access or the token aged out;
/// callers should surface that as a reconnect-required condition.
pub async fn exchange_refresh_token(
    http_client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<AccessToken> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let response = http_client
        .post(&config.token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "token refresh request failed");
            GmailError::Network(e.to_string())
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
        if parsed.error == "invalid_grant" {
            return Err(GmailError::AuthExpired(if parsed.error_description.is_empty() {
                "refresh token no longer valid".to_string()
            } else {
                parsed.error_description
            }));
        }
        warn!(status = %status, body = %body, "token endpoint error");
        return Err(GmailError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| GmailError::Parse(e.to_string()))?;

    debug!(expires_in = token.expires_in, "access token refreshed");

    Ok(AccessToken {
        token: token.access_token,
        expires_in_secs: token.expires_in,
    })
}
