use std::sync::Arc;
use std::time::Duration;

use hubmail_shared::{Identity, IdentityToken, PublicKey, TokenError};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Holds an identity in its [`Identity::to_base64`] form.
pub const IDENTITY_ENV: &str = "HUBMAIL_IDENTITY";

/// An identity plus the audience and lifetime of the tokens it mints.
/// A fresh token is minted for every call and every watch attempt.
#[derive(Debug, Clone)]
pub struct Credentials {
    identity: Arc<Identity>,
    audience: String,
    ttl: Duration,
}

impl Credentials {
    pub fn new(identity: Identity, audience: impl Into<String>, ttl: Duration) -> Self {
        Self {
            identity: Arc::new(identity),
            audience: audience.into(),
            ttl,
        }
    }

    /// Mint with the audience and token lifetime of `config`.
    pub fn from_config(identity: Identity, config: &ClientConfig) -> Self {
        Self::new(identity, config.audience.clone(), config.token_ttl)
    }

    /// Credentials for the identity exported in `HUBMAIL_IDENTITY`.
    pub fn from_env(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok(), config)
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let exported = lookup(IDENTITY_ENV)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ClientError::InvalidArgument(format!("{IDENTITY_ENV} is not set")))?;
        let identity = Identity::from_base64(&exported)
            .map_err(|e| ClientError::InvalidArgument(format!("{IDENTITY_ENV}: {e}")))?;
        Ok(Self::from_config(identity, config))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn mint(&self) -> Result<IdentityToken, TokenError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        self.identity.token(&self.audience, ttl)
    }
}
