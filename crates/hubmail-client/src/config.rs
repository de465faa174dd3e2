//! Client configuration loaded from environment variables.

use std::time::Duration;

use hubmail_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_SERVICE_AUDIENCE, RECONNECT_INTERVAL_SECS};

/// Lifetime of the identity token minted for each call.
const DEFAULT_TOKEN_TTL_SECS: u64 = 60;

/// Upper bound on one request/response call. Watch streams are not bounded.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the hubmail service.
    /// Env: `HUBMAIL_API_URL`
    /// Default: `http://127.0.0.1:5000`
    pub api_url: String,

    /// Audience tokens are minted for; must match the server's.
    /// Env: `HUBMAIL_AUDIENCE`
    pub audience: String,

    /// Env: `HUBMAIL_TOKEN_TTL_SECS`
    /// Default: 60 seconds
    pub token_ttl: Duration,

    /// Delay before a resilient watch reconnects.
    /// Env: `HUBMAIL_RECONNECT_SECS`
    /// Default: 5 seconds
    pub reconnect_interval: Duration,

    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}"),
            audience: DEFAULT_SERVICE_AUDIENCE.to_string(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            reconnect_interval: Duration::from_secs(RECONNECT_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("HUBMAIL_API_URL") {
            if !url.is_empty() {
                config.api_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Some(audience) = lookup("HUBMAIL_AUDIENCE") {
            if !audience.is_empty() {
                config.audience = audience;
            }
        }

        if let Some(secs) = seconds(&lookup, "HUBMAIL_TOKEN_TTL_SECS") {
            config.token_ttl = secs;
        }

        if let Some(secs) = seconds(&lookup, "HUBMAIL_RECONNECT_SECS") {
            config.reconnect_interval = secs;
        }

        config
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let value = lookup(key)?;
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(key, value = %value, "Invalid duration, using default");
            None
        }
    }
}
