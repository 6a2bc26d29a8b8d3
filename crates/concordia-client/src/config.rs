//! Client configuration.

use concordia_core::defaults;

/// Connection settings for the remote concordia services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the API, without trailing path.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Session token sent as a bearer credential.
    pub session_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
            session_token: None,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CONCORDIA_BASE_URL` | `http://localhost:8080` | API base URL |
    /// | `CONCORDIA_TIMEOUT_SECS` | `30` | Request timeout |
    /// | `CONCORDIA_SESSION_TOKEN` | unset | Bearer token |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("CONCORDIA_BASE_URL").unwrap_or_else(|_| defaults::BASE_URL.to_string());

        let timeout_secs = std::env::var("CONCORDIA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::HTTP_TIMEOUT_SECS);

        let session_token = std::env::var("CONCORDIA_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Self {
            base_url,
            timeout_secs,
            session_token,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Absolute URL for an API path starting with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
