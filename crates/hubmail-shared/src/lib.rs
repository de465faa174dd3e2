//! # hubmail-shared
//!
//! Types and cryptography shared by the hubmail service and its clients:
//! identities and keys, sealed encryption, the message envelope codec,
//! identity tokens and the RPC wire format.

pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod token;
pub mod types;

pub use envelope::{build_send, decode_instance, verify_and_decode, Message, MessageRecord};
pub use error::{CodecError, CryptoError, IdentityError, TokenError};
pub use identity::{Identity, PublicKey};
pub use token::IdentityToken;
pub use types::{Collection, MailboxId, MessageId, MessageStatus};
