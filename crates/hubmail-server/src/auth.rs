//! Bearer identity-token authentication.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use hubmail_shared::{IdentityToken, PublicKey};

use crate::error::ServerError;

/// Resolve the caller's public key from `Authorization: Bearer <token>`.
pub fn authenticate(headers: &HeaderMap, audience: &str) -> Result<PublicKey, ServerError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::MissingToken)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(ServerError::MissingToken)?
        .trim();

    let token = IdentityToken::decode(token)?;
    Ok(token.verify(audience)?)
}
