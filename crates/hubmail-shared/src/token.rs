//! Short-lived identity tokens.
//!
//! A token is `base64url(claims) "." base64url(signature)`, where the claims
//! are bincode-encoded and signed by the identity they name. The service only
//! learns who is calling; it never sees a secret key.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::identity::{Identity, PublicKey};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Claims {
    subject: [u8; 32],
    audience: String,
    expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken {
    claims: Claims,
    signature: Vec<u8>,
}

impl IdentityToken {
    pub(crate) fn mint(identity: &Identity, audience: &str, ttl: Duration) -> Result<Self, TokenError> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encoding(format!("lifetime {ttl} out of range")))?;
        let claims = Claims {
            subject: identity.public_key().to_bytes(),
            audience: audience.to_string(),
            expires_at: expires_at.timestamp(),
        };
        let payload = bincode::serialize(&claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let signature = identity.sign(&payload).to_bytes().to_vec();
        Ok(Self { claims, signature })
    }

    /// Check signature, audience and expiry; yields the identity the token names.
    pub fn verify(&self, audience: &str) -> Result<PublicKey, TokenError> {
        self.verify_at(audience, Utc::now())
    }

    pub fn verify_at(&self, audience: &str, now: DateTime<Utc>) -> Result<PublicKey, TokenError> {
        let subject = PublicKey::from_slice(&self.claims.subject).map_err(|_| TokenError::Malformed)?;
        let payload =
            bincode::serialize(&self.claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
        subject
            .verify(&payload, &self.signature)
            .map_err(|_| TokenError::BadSignature)?;

        if self.claims.audience != audience {
            return Err(TokenError::WrongAudience {
                expected: audience.to_string(),
                actual: self.claims.audience.clone(),
            });
        }
        if now.timestamp() > self.claims.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(subject)
    }

    pub fn encode(&self) -> Result<String, TokenError> {
        let payload =
            bincode::serialize(&self.claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(format!("{}.{}", B64URL.encode(payload), B64URL.encode(&self.signature)))
    }

    pub fn decode(s: &str) -> Result<Self, TokenError> {
        let (claims_part, signature_part) = s.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = B64URL.decode(claims_part).map_err(|_| TokenError::Malformed)?;
        let signature = B64URL.decode(signature_part).map_err(|_| TokenError::Malformed)?;
        let claims: Claims = bincode::deserialize(&payload).map_err(|_| TokenError::Malformed)?;
        Ok(Self { claims, signature })
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl FromStr for IdentityToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
