//! Short-lived catalog credentials
//!
//! Tokens are explicit values handed to the sink on every call. Refreshing is
//! the caller's decision, either directly through a [`TokenSource`] or
//! through `CachedCredential`, which refreshes only near expiry.

use crate::error::{LineageError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Assumed lifetime when the token endpoint does not say
const DEFAULT_LIFETIME_SECS: i64 = 3600;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True if the token expires within `within` of `now`
    pub fn is_expiring(&self, now: DateTime<Utc>, within: ChronoDuration) -> bool {
        self.expires_at <= now + within
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Client-credentials grant settings
#[derive(Clone)]
pub struct ClientCredentials {
    pub authority_host: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub resource: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("authority_host", &self.authority_host)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("resource", &self.resource)
            .finish()
    }
}

/// Anything that can mint a fresh access token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self) -> Result<AccessToken>;
}

/// Performs the client-credentials token exchange
pub struct TokenProvider {
    http: reqwest::Client,
    credentials: ClientCredentials,
}

impl TokenProvider {
    pub fn new(credentials: ClientCredentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, credentials })
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/token",
            self.credentials.authority_host.trim_end_matches('/'),
            self.credentials.tenant_id
        )
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn acquire(&self) -> Result<AccessToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("resource", self.credentials.resource.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| LineageError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineageError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LineageError::Auth(format!("unreadable token response: {}", e)))?;
        let token = parse_token_response(&body, Utc::now())?;
        info!(expires_at = %token.expires_at(), "Acquired catalog access token");
        Ok(token)
    }
}

/// Read `access_token` and `expires_in` (number or numeric string) from a token response.
pub fn parse_token_response(body: &Value, now: DateTime<Utc>) -> Result<AccessToken> {
    let value = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| LineageError::Auth("token response has no access_token".to_string()))?;

    let lifetime = body
        .get("expires_in")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(DEFAULT_LIFETIME_SECS);

    Ok(AccessToken::new(value, now + ChronoDuration::seconds(lifetime)))
}

/// Holds the current token and refreshes it when it gets close to expiry.
pub struct CachedCredential {
    source: Box<dyn TokenSource>,
    current: Option<AccessToken>,
    refresh_skew: ChronoDuration,
}

impl CachedCredential {
    pub fn new(source: impl TokenSource + 'static, refresh_skew: ChronoDuration) -> Self {
        Self {
            source: Box::new(source),
            current: None,
            refresh_skew,
        }
    }

    /// The held token, or a fresh one when it expires within the refresh skew.
    pub async fn current(&mut self) -> Result<AccessToken> {
        let now = Utc::now();
        match &self.current {
            Some(token) if !token.is_expiring(now, self.refresh_skew) => Ok(token.clone()),
            _ => {
                debug!("Refreshing catalog access token");
                let token = self.source.acquire().await?;
                self.current = Some(token.clone());
                Ok(token)
            }
        }
    }
}
