//! OAuth2 client-credentials token cache.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{HttpTransport, RemoteError};

/// A cached token is refreshed once it is within this margin of expiry.
pub const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Acquires and caches the bearer token for the remote API.
///
/// The cache lock is held across a refresh, so concurrent callers wait for
/// the one in-flight grant instead of each requesting their own.
pub struct TokenManager {
    transport: Arc<dyn HttpTransport>,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    pub fn get_token(&self) -> Result<String, RemoteError> {
        self.get_token_at(Utc::now())
    }

    /// Return the cached token if it is still valid at `now`, otherwise
    /// request a new one.
    pub fn get_token_at(&self, now: DateTime<Utc>) -> Result<String, RemoteError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| RemoteError::Authentication("token cache lock poisoned".into()))?;

        if let Some(token) = cached.as_ref() {
            if token.is_usable_at(now) {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("Requesting new access token");
        let token = self.request_token(now)?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Drop the cached token so the next call requests a fresh one.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }

    fn request_token(&self, now: DateTime<Utc>) -> Result<CachedToken, RemoteError> {
        let (client_id, client_secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
            _ => {
                return Err(RemoteError::Authentication(
                    "client id and secret are not configured".into(),
                ))
            }
        };

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response = self
            .transport
            .post_form(&self.token_url, &form)
            .map_err(|e| RemoteError::Authentication(format!("Token request failed: {e}")))?;

        if !response.is_success() {
            return Err(RemoteError::Authentication(format!(
                "Token request rejected with status {}: {}",
                response.status, response.body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| RemoteError::Authentication(format!("Failed to parse token response: {e}")))?;

        let expires_at = now + Duration::seconds(parsed.expires_in);
        tracing::info!(expires_at = %expires_at.to_rfc3339(), "Acquired access token");

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}
