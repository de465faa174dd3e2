use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Duration;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{DID_PREFIX, PUBKEY_SIZE, SECRET_KEY_SIZE, SIGNATURE_SIZE};
use crate::crypto;
use crate::error::{CryptoError, IdentityError, TokenError};
use crate::token::IdentityToken;

/// A mailbox owner's cryptographic identity based on Ed25519.
/// The public key is the only name an identity has.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

/// Serializable format for storing/exporting identity
#[derive(Serialize, Deserialize)]
pub struct IdentityExport {
    pub secret_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore identity from secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        Self { signing_key }
    }

    /// Restore identity from a serialized export
    pub fn from_export(export: &IdentityExport) -> Result<Self, IdentityError> {
        let identity = Self::from_secret_bytes(&export.secret_key);
        if identity.public_key().to_bytes() != export.public_key {
            return Err(IdentityError::KeyExport(
                "public key does not match secret key".to_string(),
            ));
        }
        Ok(identity)
    }

    /// Export identity for serialization
    pub fn to_export(&self) -> IdentityExport {
        IdentityExport {
            secret_key: *self.signing_key.as_bytes(),
            public_key: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Base64 of the bincode-encoded [`IdentityExport`], as carried in
    /// environment variables.
    pub fn to_base64(&self) -> Result<String, IdentityError> {
        let bytes = bincode::serialize(&self.to_export())
            .map_err(|e| IdentityError::KeyExport(e.to_string()))?;
        Ok(BASE64.encode(bytes))
    }

    /// Parse the output of [`Identity::to_base64`]. The embedded public key
    /// must match the secret key.
    pub fn from_base64(s: &str) -> Result<Self, IdentityError> {
        let bytes = BASE64
            .decode(s.trim())
            .map_err(|e| IdentityError::KeyExport(e.to_string()))?;
        if bytes.len() != SECRET_KEY_SIZE + PUBKEY_SIZE {
            return Err(IdentityError::InvalidKeyBytes);
        }
        let export: IdentityExport =
            bincode::deserialize(&bytes).map_err(|e| IdentityError::KeyExport(e.to_string()))?;
        Self::from_export(&export)
    }

    /// Get the public half of this identity
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Decrypt a payload sealed to this identity's public key.
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        crypto::open(&self.signing_key, ciphertext)
    }

    /// Mint a bearer token asserting this identity to `audience` for `ttl`.
    pub fn token(&self, audience: &str, ttl: Duration) -> Result<IdentityToken, TokenError> {
        IdentityToken::mint(self, audience, ttl)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key.
///
/// The canonical string form is 64 lowercase hex characters. The DID form
/// (`did:hubmail:<hex>`) is accepted wherever a key is parsed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a public key from its hex or DID string form.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let hex_part = s.strip_prefix(DID_PREFIX).unwrap_or(s);
        let bytes = hex::decode(hex_part)
            .map_err(|e| IdentityError::InvalidPublicKey(format!("{s:?}: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; PUBKEY_SIZE] = bytes.try_into().map_err(|_| {
            IdentityError::InvalidPublicKey(format!("expected {PUBKEY_SIZE} bytes, got {}", bytes.len()))
        })?;
        VerifyingKey::from_bytes(&arr)
            .map(Self)
            .map_err(|_| IdentityError::InvalidPublicKey("not a curve point".to_string()))
    }

    pub fn to_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Decentralized identifier form of this key.
    pub fn to_did(&self) -> String {
        format!("{DID_PREFIX}{}", self.to_hex())
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Verify a detached signature made over `message` by this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(IdentityError::BadSignature);
        }
        let signature = Signature::from_slice(signature).map_err(|_| IdentityError::BadSignature)?;
        self.0
            .verify(message, &signature)
            .map_err(|_| IdentityError::BadSignature)
    }

    /// Encrypt `plaintext` so only this key's owner can read it.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        crypto::seal(&self.0, plaintext)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short())
    }
}

impl FromStr for PublicKey {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_roundtrip() {
        let id = Identity::generate();
        let export = id.to_export();
        let restored = Identity::from_export(&export).unwrap();
        assert_eq!(id.public_key(), restored.public_key());
    }

    #[test]
    fn test_export_with_mismatched_public_key_rejected() {
        let mut export = Identity::generate().to_export();
        export.public_key = Identity::generate().public_key().to_bytes();
        assert!(Identity::from_export(&export).is_err());
    }

    #[test]
    fn test_base64_roundtrip() {
        let id = Identity::generate();
        let restored = Identity::from_base64(&id.to_base64().unwrap()).unwrap();
        assert_eq!(id.public_key(), restored.public_key());
        assert_eq!(
            Identity::from_base64("AAAA").unwrap_err(),
            IdentityError::InvalidKeyBytes
        );
    }

    #[test]
    fn test_base64_with_foreign_public_key_rejected() {
        let mut export = Identity::generate().to_export();
        export.public_key = Identity::generate().public_key().to_bytes();
        let encoded = BASE64.encode(bincode::serialize(&export).unwrap());
        assert!(matches!(
            Identity::from_base64(&encoded),
            Err(IdentityError::KeyExport(_))
        ));
    }

    #[test]
    fn test_sign_verify() {
        let id = Identity::generate();
        let message = b"Hello, hubmail!";
        let signature = id.sign(message).to_bytes();

        assert!(id.public_key().verify(message, &signature).is_ok());
        assert_eq!(
            id.public_key().verify(b"wrong", &signature),
            Err(IdentityError::BadSignature)
        );
        assert_eq!(
            id.public_key().verify(message, &signature[..10]),
            Err(IdentityError::BadSignature)
        );
    }

    #[test]
    fn test_public_key_string_forms() {
        let key = Identity::generate().public_key();
        assert_eq!(key.to_hex().len(), 64);
        assert_eq!(PublicKey::parse(&key.to_hex()).unwrap(), key);
        assert_eq!(PublicKey::parse(&key.to_did()).unwrap(), key);
        assert!(key.to_did().starts_with("did:hubmail:"));
    }

    #[test]
    fn test_public_key_rejects_garbage() {
        assert!(matches!(
            PublicKey::parse("not-a-key"),
            Err(IdentityError::InvalidPublicKey(_))
        ));
        assert!(PublicKey::parse("abcd").is_err());
        assert!(PublicKey::parse("").is_err());
    }

    #[test]
    fn test_public_key_serde() {
        let key = Identity::generate().public_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_seal_and_open_through_identity() {
        let id = Identity::generate();
        let sealed = id.public_key().seal(b"for me").unwrap();
        assert_eq!(id.open(&sealed).unwrap(), b"for me");
    }
}
