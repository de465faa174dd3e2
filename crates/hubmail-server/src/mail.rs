//! Mailbox business logic on top of a [`DocumentStore`].
//!
//! Every operation on a mailbox first checks that the caller's key owns it.
//! Messages are written twice: into the recipient's inbox, then into the
//! sender's sentbox. The second write is not rolled back or retried; a
//! failure there is reported as [`MailError::PartialSend`].

use std::sync::Arc;

use chrono::Utc;
use hubmail_shared::constants::MAILBOX_DB_NAME;
use hubmail_shared::envelope::Envelope;
use hubmail_shared::{Collection, MailboxId, MessageId, MessageRecord, PublicKey};
use hubmail_store::{ChangeStream, DatabaseInfo, DocumentStore, Query, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::query::{mailbox_query, QueryError};
use crate::schema;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Signature does not match sender")]
    BadSignature,

    #[error("Mailbox belongs to another identity")]
    Forbidden,

    #[error("Mailbox not found")]
    MailboxNotFound,

    #[error("Recipient has no mailbox")]
    RecipientNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Mailbox already exists")]
    MailboxExists,

    /// The inbox copy landed but the sentbox copy did not.
    #[error("Message {id} delivered but sentbox write failed: {source}")]
    PartialSend { id: String, source: StoreError },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Both copies of a message as submitted by the sender.
#[derive(Debug, Clone)]
pub struct Submission {
    pub to: String,
    pub inbox: Envelope,
    pub sentbox: Envelope,
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub id: MessageId,
    /// Nanoseconds since the Unix epoch.
    pub created_at: i64,
}

#[derive(Clone)]
pub struct Mail {
    store: Arc<dyn DocumentStore>,
}

impl Mail {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Register the caller's mailbox. Each identity owns at most one.
    pub async fn new_mailbox(&self, owner: &PublicKey) -> Result<MailboxId, MailError> {
        let id = MailboxId::random();
        match self
            .store
            .new_db(
                &id.to_hex(),
                MAILBOX_DB_NAME,
                &owner.to_hex(),
                &schema::mailbox_collections(),
            )
            .await
        {
            Ok(_) => {
                info!(mailbox = %id.short(), owner = %owner.short(), "mailbox created");
                Ok(id)
            }
            Err(e) if e.is_duplicate() => Err(MailError::MailboxExists),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn send_message(
        &self,
        sender: &PublicKey,
        mailbox: &MailboxId,
        submission: Submission,
    ) -> Result<Sent, MailError> {
        let to = PublicKey::parse(&submission.to)
            .map_err(|e| MailError::InvalidKey(e.to_string()))?;

        for envelope in [&submission.inbox, &submission.sentbox] {
            sender
                .verify(&envelope.body, &envelope.signature)
                .map_err(|_| MailError::BadSignature)?;
        }

        let own = self.owned(sender, mailbox).await?;
        let recipient = match self.store.find_db(MAILBOX_DB_NAME, &to.to_hex()).await {
            Ok(db) => db,
            Err(StoreError::DatabaseNotFound) => return Err(MailError::RecipientNotFound),
            Err(e) => return Err(e.into()),
        };

        let id = MessageId::new();
        let created_at = now_nanos();

        let inbox_copy = MessageRecord::from_envelope(
            &id,
            sender,
            &to,
            &submission.inbox,
            created_at,
            Some(0),
        );
        let sentbox_copy =
            MessageRecord::from_envelope(&id, sender, &to, &submission.sentbox, created_at, None);

        self.store
            .create(&recipient.id, Collection::Inbox.name(), &to_value(&inbox_copy)?)
            .await?;

        if let Err(source) = self
            .store
            .create(&own.id, Collection::Sentbox.name(), &to_value(&sentbox_copy)?)
            .await
        {
            warn!(%id, error = %source, "sentbox write failed after inbox delivery");
            return Err(MailError::PartialSend {
                id: id.to_string(),
                source,
            });
        }

        debug!(%id, from = %sender.short(), to = %to.short(), "message sent");
        Ok(Sent { id, created_at })
    }

    pub async fn list_inbox_messages(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        seek: &str,
        limit: i64,
        ascending: bool,
        status: i32,
    ) -> Result<Vec<MessageRecord>, MailError> {
        let query = mailbox_query(seek, limit, ascending, status)?;
        self.list(caller, mailbox, Collection::Inbox, &query).await
    }

    pub async fn list_sentbox_messages(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        seek: &str,
        limit: i64,
        ascending: bool,
    ) -> Result<Vec<MessageRecord>, MailError> {
        let query = mailbox_query(seek, limit, ascending, 0)?;
        self.list(caller, mailbox, Collection::Sentbox, &query).await
    }

    /// Mark an inbox message read and return its read time. The first call
    /// stamps the current time; later calls return the stored value.
    pub async fn read_inbox_message(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        id: &str,
    ) -> Result<i64, MailError> {
        let id = parse_message_id(id)?;
        let db = self.owned(caller, mailbox).await?;
        let inbox = Collection::Inbox.name();

        let mut record = self.get_record(&db.id, inbox, &id).await?;
        match record.read_at {
            Some(read_at) if read_at > 0 => Ok(read_at),
            _ => {
                let read_at = now_nanos();
                record.read_at = Some(read_at);
                self.store
                    .save(&db.id, inbox, &to_value(&record)?)
                    .await
                    .map_err(not_found_as_message)?;
                debug!(%id, read_at, "message marked read");
                Ok(read_at)
            }
        }
    }

    pub async fn delete_inbox_message(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        id: &str,
    ) -> Result<(), MailError> {
        self.delete(caller, mailbox, Collection::Inbox, id).await
    }

    pub async fn delete_sentbox_message(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        id: &str,
    ) -> Result<(), MailError> {
        self.delete(caller, mailbox, Collection::Sentbox, id).await
    }

    /// Subscribe to raw changes of one of the caller's collections.
    pub async fn listen(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        collection: Collection,
    ) -> Result<ChangeStream, MailError> {
        let db = self.owned(caller, mailbox).await?;
        Ok(self.store.listen(&db.id, collection.name()))
    }

    async fn list(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<MessageRecord>, MailError> {
        let db = self.owned(caller, mailbox).await?;
        self.store
            .list(&db.id, collection.name(), query)
            .await?
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).map_err(|e| MailError::Corrupt(e.to_string()))
            })
            .collect()
    }

    async fn delete(
        &self,
        caller: &PublicKey,
        mailbox: &MailboxId,
        collection: Collection,
        id: &str,
    ) -> Result<(), MailError> {
        let id = parse_message_id(id)?;
        let db = self.owned(caller, mailbox).await?;
        self.store
            .delete(&db.id, collection.name(), &id.to_string())
            .await
            .map_err(not_found_as_message)?;
        debug!(%id, %collection, "message deleted");
        Ok(())
    }

    async fn get_record(
        &self,
        db: &str,
        collection: &str,
        id: &MessageId,
    ) -> Result<MessageRecord, MailError> {
        let value = self
            .store
            .get(db, collection, &id.to_string())
            .await
            .map_err(not_found_as_message)?;
        serde_json::from_value(value).map_err(|e| MailError::Corrupt(e.to_string()))
    }

    /// Look up `mailbox` and check `caller` owns it.
    async fn owned(&self, caller: &PublicKey, mailbox: &MailboxId) -> Result<DatabaseInfo, MailError> {
        let db = match self.store.get_db(&mailbox.to_hex()).await {
            Ok(db) => db,
            Err(StoreError::DatabaseNotFound) => return Err(MailError::MailboxNotFound),
            Err(e) => return Err(e.into()),
        };
        if db.owner != caller.to_hex() {
            return Err(MailError::Forbidden);
        }
        Ok(db)
    }
}

fn parse_message_id(id: &str) -> Result<MessageId, MailError> {
    MessageId::parse(id).map_err(|e| MailError::InvalidArgument(e.to_string()))
}

fn not_found_as_message(e: StoreError) -> MailError {
    match e {
        StoreError::NotFound => MailError::MessageNotFound,
        other => MailError::Store(other),
    }
}

fn to_value(record: &MessageRecord) -> Result<serde_json::Value, MailError> {
    serde_json::to_value(record).map_err(|e| MailError::Store(e.into()))
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use hubmail_shared::{build_send, verify_and_decode, Identity, MessageStatus};
    use hubmail_store::{CollectionConfig, SqliteStore};
    use serde_json::Value;

    use super::*;

    fn mail() -> Mail {
        Mail::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    /// Delegates to SQLite but refuses every write into `sentbox`.
    struct SentboxDown(SqliteStore);

    #[async_trait]
    impl DocumentStore for SentboxDown {
        async fn new_db(
            &self,
            id: &str,
            name: &str,
            owner: &str,
            collections: &[CollectionConfig],
        ) -> hubmail_store::Result<DatabaseInfo> {
            self.0.new_db(id, name, owner, collections).await
        }

        async fn get_db(&self, id: &str) -> hubmail_store::Result<DatabaseInfo> {
            self.0.get_db(id).await
        }

        async fn find_db(&self, name: &str, owner: &str) -> hubmail_store::Result<DatabaseInfo> {
            self.0.find_db(name, owner).await
        }

        async fn create(
            &self,
            db: &str,
            collection: &str,
            instance: &Value,
        ) -> hubmail_store::Result<String> {
            if collection == Collection::Sentbox.name() {
                return Err(StoreError::Poisoned);
            }
            self.0.create(db, collection, instance).await
        }

        async fn save(&self, db: &str, collection: &str, instance: &Value) -> hubmail_store::Result<()> {
            self.0.save(db, collection, instance).await
        }

        async fn get(&self, db: &str, collection: &str, id: &str) -> hubmail_store::Result<Value> {
            self.0.get(db, collection, id).await
        }

        async fn delete(&self, db: &str, collection: &str, id: &str) -> hubmail_store::Result<()> {
            self.0.delete(db, collection, id).await
        }

        async fn list(
            &self,
            db: &str,
            collection: &str,
            query: &Query,
        ) -> hubmail_store::Result<Vec<Value>> {
            self.0.list(db, collection, query).await
        }

        fn listen(&self, db: &str, collection: &str) -> ChangeStream {
            self.0.listen(db, collection)
        }
    }

    fn submission(from: &Identity, to: &Identity, body: &[u8]) -> Submission {
        let out = build_send(from, &to.public_key().to_hex(), body).unwrap();
        Submission {
            to: out.to.to_hex(),
            inbox: out.inbox,
            sentbox: out.sentbox,
        }
    }

    #[tokio::test]
    async fn test_mailbox_created_once() {
        let mail = mail();
        let alice = Identity::generate();

        mail.new_mailbox(&alice.public_key()).await.unwrap();
        assert!(matches!(
            mail.new_mailbox(&alice.public_key()).await,
            Err(MailError::MailboxExists)
        ));
    }

    #[tokio::test]
    async fn test_send_lands_in_both_collections() {
        let mail = mail();
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();
        let bob_box = mail.new_mailbox(&bob.public_key()).await.unwrap();

        let sent = mail
            .send_message(&alice.public_key(), &alice_box, submission(&alice, &bob, b"hi"))
            .await
            .unwrap();

        let inbox = mail
            .list_inbox_messages(&bob.public_key(), &bob_box, "", 0, true, 0)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, sent.id.to_string());
        assert_eq!(inbox[0].read_at, Some(0));
        assert_eq!(inbox[0].created_at, sent.created_at);
        let message = verify_and_decode(&inbox[0]).unwrap();
        assert_eq!(message.open(&bob).unwrap(), b"hi");

        let sentbox = mail
            .list_sentbox_messages(&alice.public_key(), &alice_box, "", 0, true)
            .await
            .unwrap();
        assert_eq!(sentbox.len(), 1);
        assert_eq!(sentbox[0].id, inbox[0].id);
        assert_eq!(sentbox[0].read_at, None);
        assert_ne!(sentbox[0].body, inbox[0].body);
        assert_eq!(verify_and_decode(&sentbox[0]).unwrap().open(&alice).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_failed_sentbox_write_is_partial_send() {
        let mail = Mail::new(Arc::new(SentboxDown(SqliteStore::open_in_memory().unwrap())));
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();
        let bob_box = mail.new_mailbox(&bob.public_key()).await.unwrap();

        let id = match mail
            .send_message(&alice.public_key(), &alice_box, submission(&alice, &bob, b"hi"))
            .await
        {
            Err(MailError::PartialSend { id, source }) => {
                assert!(matches!(source, StoreError::Poisoned));
                id
            }
            other => panic!("expected PartialSend, got {other:?}"),
        };

        // The recipient's copy stays delivered under the reported id.
        let inbox = mail
            .list_inbox_messages(&bob.public_key(), &bob_box, "", 0, true, 0)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, id);
        assert!(mail
            .list_sentbox_messages(&alice.public_key(), &alice_box, "", 0, true)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_send_rejects_forged_signature() {
        let mail = mail();
        let (alice, bob, mallory) = (Identity::generate(), Identity::generate(), Identity::generate());
        let mallory_box = mail.new_mailbox(&mallory.public_key()).await.unwrap();
        mail.new_mailbox(&bob.public_key()).await.unwrap();

        // Signed by alice, submitted under mallory's token.
        let result = mail
            .send_message(&mallory.public_key(), &mallory_box, submission(&alice, &bob, b"x"))
            .await;
        assert!(matches!(result, Err(MailError::BadSignature)));
    }

    #[tokio::test]
    async fn test_send_validation() {
        let mail = mail();
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();

        let mut bad_key = submission(&alice, &bob, b"x");
        bad_key.to = "zz".to_string();
        assert!(matches!(
            mail.send_message(&alice.public_key(), &alice_box, bad_key).await,
            Err(MailError::InvalidKey(_))
        ));

        assert!(matches!(
            mail.send_message(&alice.public_key(), &alice_box, submission(&alice, &bob, b"x"))
                .await,
            Err(MailError::RecipientNotFound)
        ));
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let mail = mail();
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();

        assert!(matches!(
            mail.list_inbox_messages(&bob.public_key(), &alice_box, "", 0, true, 0)
                .await,
            Err(MailError::Forbidden)
        ));
        assert!(matches!(
            mail.list_inbox_messages(&alice.public_key(), &MailboxId::random(), "", 0, true, 0)
                .await,
            Err(MailError::MailboxNotFound)
        ));
    }

    #[tokio::test]
    async fn test_read_stamps_once() {
        let mail = mail();
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();
        let bob_box = mail.new_mailbox(&bob.public_key()).await.unwrap();
        let sent = mail
            .send_message(&alice.public_key(), &alice_box, submission(&alice, &bob, b"hi"))
            .await
            .unwrap();
        let id = sent.id.to_string();

        let unread = MessageStatus::Unread.to_wire();
        let read = MessageStatus::Read.to_wire();
        let bob_key = bob.public_key();

        let first = mail.read_inbox_message(&bob_key, &bob_box, &id).await.unwrap();
        assert!(first >= sent.created_at);
        let second = mail.read_inbox_message(&bob_key, &bob_box, &id).await.unwrap();
        assert_eq!(first, second);

        assert!(mail
            .list_inbox_messages(&bob_key, &bob_box, "", 0, true, unread)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            mail.list_inbox_messages(&bob_key, &bob_box, "", 0, true, read)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_descending_lists_newest_first() {
        let mail = mail();
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();
        let bob_box = mail.new_mailbox(&bob.public_key()).await.unwrap();

        let mut ids = Vec::new();
        for body in [b"one", b"two", b"333"] {
            let sent = mail
                .send_message(&alice.public_key(), &alice_box, submission(&alice, &bob, body))
                .await
                .unwrap();
            ids.push(sent.id.to_string());
        }

        let page = mail
            .list_inbox_messages(&bob.public_key(), &bob_box, "", 2, false, 0)
            .await
            .unwrap();
        let got: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, [ids[2].as_str(), ids[1].as_str()]);

        // Next page continues from the last id of the previous one.
        let next = mail
            .list_inbox_messages(&bob.public_key(), &bob_box, &page[1].id, 2, false, 0)
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let mail = mail();
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();
        let bob_box = mail.new_mailbox(&bob.public_key()).await.unwrap();
        let sent = mail
            .send_message(&alice.public_key(), &alice_box, submission(&alice, &bob, b"bye"))
            .await
            .unwrap();
        let id = sent.id.to_string();

        mail.delete_inbox_message(&bob.public_key(), &bob_box, &id)
            .await
            .unwrap();
        assert!(matches!(
            mail.read_inbox_message(&bob.public_key(), &bob_box, &id).await,
            Err(MailError::MessageNotFound)
        ));
        assert!(matches!(
            mail.delete_inbox_message(&bob.public_key(), &bob_box, &id).await,
            Err(MailError::MessageNotFound)
        ));

        // The sentbox copy is independent.
        mail.delete_sentbox_message(&alice.public_key(), &alice_box, &id)
            .await
            .unwrap();
        assert!(matches!(
            mail.delete_sentbox_message(&alice.public_key(), &alice_box, "not-an-id")
                .await,
            Err(MailError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_status() {
        let mail = mail();
        let alice = Identity::generate();
        let alice_box = mail.new_mailbox(&alice.public_key()).await.unwrap();
        assert!(matches!(
            mail.list_inbox_messages(&alice.public_key(), &alice_box, "", 0, true, 9)
                .await,
            Err(MailError::Query(QueryError::UnknownStatus(9)))
        ));
    }
}
