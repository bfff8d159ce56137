use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "CareSync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const ENV_API_BASE_URL: &str = "CARESYNC_API_BASE_URL";
const ENV_CLIENT_ID: &str = "CARESYNC_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "CARESYNC_CLIENT_SECRET";
const ENV_DB_PATH: &str = "CARESYNC_DB_PATH";
const ENV_HTTP_TIMEOUT_SECS: &str = "CARESYNC_HTTP_TIMEOUT_SECS";

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Get the application data directory
/// ~/CareSync/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("caresync.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "caresync=info,warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration for a sync engine instance.
///
/// Client credentials are optional at load time: a missing id or secret
/// surfaces as an authentication error on the first token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub db_path: PathBuf,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    /// Load from `CARESYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base_url = non_empty(ENV_API_BASE_URL).ok_or(ConfigError::Missing(ENV_API_BASE_URL))?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: ENV_API_BASE_URL,
                value: api_base_url,
            });
        }

        let http_timeout_secs = match non_empty(ENV_HTTP_TIMEOUT_SECS) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: ENV_HTTP_TIMEOUT_SECS,
                value: raw,
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client_id: non_empty(ENV_CLIENT_ID),
            client_secret: non_empty(ENV_CLIENT_SECRET),
            db_path: non_empty(ENV_DB_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            http_timeout_secs,
        })
    }

    /// Client-credentials grant endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn base_url_is_required() {
        let err = SyncConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("CARESYNC_API_BASE_URL"));
    }

    #[test]
    fn defaults_applied() {
        let config = SyncConfig::from_lookup(lookup(&[(
            "CARESYNC_API_BASE_URL",
            "https://api.example.test/v1/",
        )]))
        .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.test/v1");
        assert_eq!(config.token_url(), "https://api.example.test/v1/oauth/token");
        assert_eq!(config.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
        assert_eq!(config.db_path, default_db_path());
        assert!(config.client_id.is_none());
    }

    #[test]
    fn blank_credentials_are_treated_as_missing() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CARESYNC_API_BASE_URL", "https://api.example.test"),
            ("CARESYNC_CLIENT_ID", "  "),
            ("CARESYNC_CLIENT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert!(config.client_id.is_none());
        assert_eq!(config.client_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn invalid_timeout_rejected() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("CARESYNC_API_BASE_URL", "https://api.example.test"),
            ("CARESYNC_HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CARESYNC_HTTP_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn non_http_base_url_rejected() {
        let err = SyncConfig::from_lookup(lookup(&[("CARESYNC_API_BASE_URL", "ftp://example")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("CareSync"));
        assert!(default_db_path().starts_with(app_data_dir()));
    }
}
