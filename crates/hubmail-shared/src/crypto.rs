use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::constants::{EPHEMERAL_KEY_SIZE, KDF_CONTEXT_SEALED_BOX, NONCE_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; 32];

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s signing key can
/// read it.
///
/// The Ed25519 key is mapped to its X25519 (Montgomery) form and combined with
/// a fresh ephemeral secret. Output layout:
/// `ephemeral_pub (32) || nonce (24) || ciphertext+tag`.
pub fn seal(recipient: &VerifyingKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let recipient_x = X25519Public::from(recipient.to_montgomery().to_bytes());
    let ephemeral = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_pub = X25519Public::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient_x);
    if !shared.was_contributory() {
        return Err(CryptoError::EncryptionFailed);
    }
    let key = derive_sealing_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient_x.as_bytes());

    let sealed = encrypt(&key, plaintext)?;
    let mut output = Vec::with_capacity(EPHEMERAL_KEY_SIZE + sealed.len());
    output.extend_from_slice(ephemeral_pub.as_bytes());
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Reverse of [`seal`] using the recipient's signing key.
pub fn open(recipient: &SigningKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < EPHEMERAL_KEY_SIZE + NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (ephemeral_bytes, sealed) = data.split_at(EPHEMERAL_KEY_SIZE);
    let mut ephemeral = [0u8; EPHEMERAL_KEY_SIZE];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_pub = X25519Public::from(ephemeral);

    let secret = StaticSecret::from(recipient.to_scalar_bytes());
    let own_pub = X25519Public::from(&secret);
    let shared = secret.diffie_hellman(&ephemeral_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }
    let key = derive_sealing_key(shared.as_bytes(), ephemeral_pub.as_bytes(), own_pub.as_bytes());

    decrypt(&key, sealed)
}

// BLAKE3 KDF with domain separation, bound to both public halves
fn derive_sealing_key(shared_secret: &[u8], ephemeral_pub: &[u8], recipient_pub: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_SEALED_BOX);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pub);
    hasher.update(recipient_pub);
    let hash = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash.as_bytes()[..32]);
    key
}
