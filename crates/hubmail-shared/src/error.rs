use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Bad signature")]
    BadSignature,

    #[error("Invalid mailbox id: {0}")]
    InvalidMailboxId(String),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("Key export error: {0}")]
    KeyExport(String),
}

/// Failures of the envelope codec. Each one means the copy must not be accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid recipient key: {0}")]
    InvalidRecipientKey(String),

    #[error("Invalid key in message: {0}")]
    InvalidKey(String),

    #[error("Bad message signature")]
    BadSignature,

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("Malformed message encoding: {0}")]
    Encoding(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token audience mismatch: expected {expected}, got {actual}")]
    WrongAudience { expected: String, actual: String },

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}
