//! Message envelopes and the codec that builds and verifies them.
//!
//! Every message is persisted twice. The inbox copy is sealed to the
//! recipient and the sentbox copy to the sender; both are signed by the
//! sender. Nothing read back from the store becomes a [`Message`] without
//! passing [`verify_and_decode`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CryptoError};
use crate::identity::{Identity, PublicKey};
use crate::types::MessageId;

/// One signed ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub body: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    fn seal(sender: &Identity, reader: &PublicKey, plaintext: &[u8]) -> Result<Self, CryptoError> {
        let body = reader.seal(plaintext)?;
        let signature = sender.sign(&body).to_bytes().to_vec();
        Ok(Self { body, signature })
    }
}

/// Both copies of an outgoing message, ready to hand to the service.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to: PublicKey,
    /// Sealed to the recipient.
    pub inbox: Envelope,
    /// Sealed to the sender.
    pub sentbox: Envelope,
}

/// Stored and wire layout of a single message copy.
///
/// `read_at` is present on inbox copies only; zero means unread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub from: String,
    pub to: String,
    /// Base64 ciphertext
    pub body: String,
    /// Base64 Ed25519 signature over the decoded body
    pub signature: String,
    /// Nanoseconds since the Unix epoch
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<i64>,
}

impl MessageRecord {
    /// Assemble the stored form of one copy.
    pub fn from_envelope(
        id: &MessageId,
        from: &PublicKey,
        to: &PublicKey,
        envelope: &Envelope,
        created_at: i64,
        read_at: Option<i64>,
    ) -> Self {
        Self {
            id: id.to_string(),
            from: from.to_did(),
            to: to.to_did(),
            body: BASE64.encode(&envelope.body),
            signature: BASE64.encode(&envelope.signature),
            created_at,
            read_at,
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.unwrap_or(0) > 0
    }
}

/// A verified message copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub from: PublicKey,
    pub to: PublicKey,
    /// Ciphertext; see [`Message::open`].
    pub body: Vec<u8>,
    pub signature: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Decrypt the body with the identity this copy was sealed to.
    pub fn open(&self, identity: &Identity) -> Result<Vec<u8>, CryptoError> {
        identity.open(&self.body)
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Seal `plaintext` for the recipient and for the sender, signing both.
///
/// Fails without producing either copy if any step fails.
pub fn build_send(
    sender: &Identity,
    recipient: &str,
    plaintext: &[u8],
) -> Result<OutboundMessage, CodecError> {
    let to = PublicKey::parse(recipient)
        .map_err(|e| CodecError::InvalidRecipientKey(e.to_string()))?;

    let inbox = Envelope::seal(sender, &to, plaintext)?;
    let sentbox = Envelope::seal(sender, &sender.public_key(), plaintext)?;

    Ok(OutboundMessage { to, inbox, sentbox })
}

/// Verify a stored copy against its declared sender and decode it.
pub fn verify_and_decode(record: &MessageRecord) -> Result<Message, CodecError> {
    let from = PublicKey::parse(&record.from).map_err(|e| CodecError::InvalidKey(e.to_string()))?;
    let to = PublicKey::parse(&record.to).map_err(|e| CodecError::InvalidKey(e.to_string()))?;

    let body = BASE64
        .decode(&record.body)
        .map_err(|e| CodecError::Encoding(format!("body: {e}")))?;
    let signature = BASE64
        .decode(&record.signature)
        .map_err(|e| CodecError::Encoding(format!("signature: {e}")))?;

    from.verify(&body, &signature)
        .map_err(|_| CodecError::BadSignature)?;

    let id = MessageId::parse(&record.id).map_err(|e| CodecError::InvalidMessageId(e.to_string()))?;
    let read_at = match record.read_at {
        Some(ns) if ns > 0 => Some(DateTime::from_timestamp_nanos(ns)),
        _ => None,
    };

    Ok(Message {
        id,
        from,
        to,
        body,
        signature,
        created_at: DateTime::from_timestamp_nanos(record.created_at),
        read_at,
    })
}

/// Decode a raw JSON instance as delivered by the store's change feed.
pub fn decode_instance(instance: &serde_json::Value) -> Result<Message, CodecError> {
    let record: MessageRecord = serde_json::from_value(instance.clone())
        .map_err(|e| CodecError::Encoding(e.to_string()))?;
    verify_and_decode(&record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_inbox_copy(sender: &Identity, recipient: &Identity, plaintext: &[u8]) -> MessageRecord {
        let outbound = build_send(sender, &recipient.public_key().to_hex(), plaintext).unwrap();
        MessageRecord::from_envelope(
            &MessageId::new(),
            &sender.public_key(),
            &outbound.to,
            &outbound.inbox,
            1_700_000_000_000_000_000,
            Some(0),
        )
    }

    #[test]
    fn test_inbox_copy_opens_for_recipient() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let record = stored_inbox_copy(&alice, &bob, b"hi");

        let message = verify_and_decode(&record).unwrap();
        assert_eq!(message.from, alice.public_key());
        assert_eq!(message.to, bob.public_key());
        assert_eq!(message.open(&bob).unwrap(), b"hi");
        assert!(message.open(&alice).is_err());
        assert!(!message.is_read());
    }

    #[test]
    fn test_sentbox_copy_opens_for_sender() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let outbound = build_send(&alice, &bob.public_key().to_did(), b"hello bob").unwrap();

        assert_ne!(outbound.inbox, outbound.sentbox);
        let record = MessageRecord::from_envelope(
            &MessageId::new(),
            &alice.public_key(),
            &outbound.to,
            &outbound.sentbox,
            1,
            None,
        );
        let message = verify_and_decode(&record).unwrap();
        assert_eq!(message.open(&alice).unwrap(), b"hello bob");
        assert!(message.open(&bob).is_err());
    }

    #[test]
    fn test_invalid_recipient_key() {
        let alice = Identity::generate();
        assert!(matches!(
            build_send(&alice, "not a key", b"x"),
            Err(CodecError::InvalidRecipientKey(_))
        ));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mut record = stored_inbox_copy(&alice, &bob, b"payload");

        let mut body = BASE64.decode(&record.body).unwrap();
        for i in 0..body.len() {
            body[i] ^= 0x01;
            let mut tampered = record.clone();
            tampered.body = BASE64.encode(&body);
            assert_eq!(verify_and_decode(&tampered), Err(CodecError::BadSignature));
            body[i] ^= 0x01;
        }
        record.body = BASE64.encode(&body);
        assert!(verify_and_decode(&record).is_ok());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let record = stored_inbox_copy(&alice, &bob, b"payload");

        let signature = BASE64.decode(&record.signature).unwrap();
        for i in 0..signature.len() {
            let mut forged = signature.clone();
            forged[i] ^= 0x80;
            let mut tampered = record.clone();
            tampered.signature = BASE64.encode(&forged);
            assert_eq!(verify_and_decode(&tampered), Err(CodecError::BadSignature));
        }
    }

    #[test]
    fn test_impersonated_sender_rejected() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mallory = Identity::generate();
        let mut record = stored_inbox_copy(&mallory, &bob, b"trust me");
        record.from = alice.public_key().to_did();

        assert_eq!(verify_and_decode(&record), Err(CodecError::BadSignature));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mut record = stored_inbox_copy(&alice, &bob, b"x");
        record.to = "garbage".to_string();
        assert!(matches!(verify_and_decode(&record), Err(CodecError::InvalidKey(_))));

        let mut record = stored_inbox_copy(&alice, &bob, b"x");
        record.from = String::new();
        assert!(matches!(verify_and_decode(&record), Err(CodecError::InvalidKey(_))));
    }

    #[test]
    fn test_read_at_mapping() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mut record = stored_inbox_copy(&alice, &bob, b"x");

        record.read_at = Some(1_700_000_000_123_456_789);
        let message = verify_and_decode(&record).unwrap();
        assert_eq!(
            message.read_at.unwrap().timestamp_nanos_opt(),
            Some(1_700_000_000_123_456_789)
        );

        record.read_at = None;
        assert!(!verify_and_decode(&record).unwrap().is_read());
    }

    #[test]
    fn test_record_layout() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let record = stored_inbox_copy(&alice, &bob, b"x");
        let json = serde_json::to_value(&record).unwrap();

        assert!(json.get("_id").is_some());
        assert_eq!(json["read_at"], 0);
        assert_eq!(json["created_at"], 1_700_000_000_000_000_000i64);

        let mut sent = record.clone();
        sent.read_at = None;
        assert!(serde_json::to_value(&sent).unwrap().get("read_at").is_none());
    }

    #[test]
    fn test_decode_instance() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let record = stored_inbox_copy(&alice, &bob, b"live");
        let instance = serde_json::to_value(&record).unwrap();

        let message = decode_instance(&instance).unwrap();
        assert_eq!(message.open(&bob).unwrap(), b"live");
        assert!(matches!(
            decode_instance(&serde_json::json!({"_id": 1})),
            Err(CodecError::Encoding(_))
        ));
    }
}
