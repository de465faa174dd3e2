/// Application name
pub const APP_NAME: &str = "hubmail";

/// Name under which every mailbox database is registered in the store
pub const MAILBOX_DB_NAME: &str = "hubmail";

/// Collection holding messages addressed to the mailbox owner
pub const INBOX_COLLECTION: &str = "inbox";

/// Collection holding copies of messages sent by the mailbox owner
pub const SENTBOX_COLLECTION: &str = "sentbox";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Ephemeral X25519 public key prepended to every sealed payload
pub const EPHEMERAL_KEY_SIZE: usize = 32;

/// Mailbox identifier size in bytes
pub const MAILBOX_ID_SIZE: usize = 32;

/// DID method prefix used when rendering public keys as identifiers
pub const DID_PREFIX: &str = "did:hubmail:";

/// Page size used when a list request asks for zero messages
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest page a single list request may return
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Default audience identity tokens are minted for
pub const DEFAULT_SERVICE_AUDIENCE: &str = "hubmail-service";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Delay between watch reconnect attempts in resilient mode
pub const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_SEALED_BOX: &str = "hubmail-sealed-box-v1";
