//! Identity-bound mailbox facade.
//!
//! Seals and signs outgoing messages, and verifies every incoming record
//! before handing it out. A list fails as a whole if any record in the page
//! does not verify.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hubmail_shared::protocol::{
    ListInboxMessagesRequest, ListSentboxMessagesRequest, MessageRequest, SendMessageRequest,
};
use hubmail_shared::{
    build_send, verify_and_decode, Collection, MailboxId, Message, MessageId, MessageRecord,
    MessageStatus,
};
use tokio::sync::watch;
use tracing::debug;

use crate::api::MailApi;
use crate::credentials::Credentials;
use crate::error::{ClientError, Result};
use crate::watch::{spawn_watch, ChangeSource, WatchConfig, WatchHandle};

/// Paging and filter options of one list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Exclusive cursor; empty starts at the beginning (or end, descending).
    pub seek: String,
    /// Zero means the server default.
    pub limit: i64,
    pub ascending: bool,
    /// Ignored for sentbox listings.
    pub status: MessageStatus,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seek(mut self, id: &MessageId) -> Self {
        self.seek = id.to_string();
        self
    }

    /// Continue after the last message of a previous page.
    pub fn after(self, message: &Message) -> Self {
        self.seek(&message.id)
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    pub fn status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
}

pub struct Mailbox<A> {
    api: Arc<A>,
    credentials: Credentials,
    id: MailboxId,
}

impl<A: MailApi> Mailbox<A> {
    /// Register a new mailbox for the credentials' identity.
    pub async fn create(api: Arc<A>, credentials: Credentials) -> Result<Self> {
        let token = credentials.mint()?;
        let response = api.new_mailbox(&token).await?;
        let id = MailboxId::parse(&response.mailbox)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        debug!(mailbox = %id.short(), "mailbox created");
        Ok(Self::open(api, credentials, id))
    }

    /// Bind to an existing mailbox.
    pub fn open(api: Arc<A>, credentials: Credentials, id: MailboxId) -> Self {
        Self {
            api,
            credentials,
            id,
        }
    }

    pub fn id(&self) -> &MailboxId {
        &self.id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Seal `body` for `to` (hex or DID public key) and for ourselves, then
    /// submit both copies.
    ///
    /// If the recipient's copy landed but ours did not, the call fails with
    /// [`ClientError::PartialSend`] carrying the delivered id; retrying would
    /// deliver a duplicate.
    pub async fn send_message(&self, to: &str, body: &[u8]) -> Result<SentMessage> {
        let outbound = build_send(self.credentials.identity(), to, body)?;

        let req = SendMessageRequest {
            mailbox: self.id.to_hex(),
            to: outbound.to.to_hex(),
            to_body: outbound.inbox.body,
            to_signature: outbound.inbox.signature,
            from_body: outbound.sentbox.body,
            from_signature: outbound.sentbox.signature,
        };
        let token = self.credentials.mint()?;
        let response = self.api.send_message(&token, &req).await?;

        let id = MessageId::parse(&response.id).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(SentMessage {
            id,
            created_at: DateTime::from_timestamp_nanos(response.created_at),
        })
    }

    pub async fn list_inbox_messages(&self, options: &ListOptions) -> Result<Vec<Message>> {
        let req = ListInboxMessagesRequest {
            mailbox: self.id.to_hex(),
            seek: options.seek.clone(),
            limit: options.limit,
            ascending: options.ascending,
            status: options.status.to_wire(),
        };
        let token = self.credentials.mint()?;
        let response = self.api.list_inbox_messages(&token, &req).await?;
        verify_all(&response.messages)
    }

    pub async fn list_sentbox_messages(&self, options: &ListOptions) -> Result<Vec<Message>> {
        let req = ListSentboxMessagesRequest {
            mailbox: self.id.to_hex(),
            seek: options.seek.clone(),
            limit: options.limit,
            ascending: options.ascending,
        };
        let token = self.credentials.mint()?;
        let response = self.api.list_sentbox_messages(&token, &req).await?;
        verify_all(&response.messages)
    }

    /// Mark an inbox message read; returns when it was first read.
    pub async fn read_inbox_message(&self, id: &MessageId) -> Result<DateTime<Utc>> {
        let token = self.credentials.mint()?;
        let response = self
            .api
            .read_inbox_message(&token, &self.message_request(id))
            .await?;
        Ok(DateTime::from_timestamp_nanos(response.read_at))
    }

    pub async fn delete_inbox_message(&self, id: &MessageId) -> Result<()> {
        let token = self.credentials.mint()?;
        self.api
            .delete_inbox_message(&token, &self.message_request(id))
            .await
    }

    pub async fn delete_sentbox_message(&self, id: &MessageId) -> Result<()> {
        let token = self.credentials.mint()?;
        self.api
            .delete_sentbox_message(&token, &self.message_request(id))
            .await
    }

    fn message_request(&self, id: &MessageId) -> MessageRequest {
        MessageRequest {
            mailbox: self.id.to_hex(),
            id: id.to_string(),
        }
    }
}

impl<A: ChangeSource + 'static> Mailbox<A> {
    pub fn watch_inbox(&self, config: WatchConfig, shutdown: watch::Receiver<bool>) -> WatchHandle {
        self.watch(Collection::Inbox, config, shutdown)
    }

    pub fn watch_sentbox(
        &self,
        config: WatchConfig,
        shutdown: watch::Receiver<bool>,
    ) -> WatchHandle {
        self.watch(Collection::Sentbox, config, shutdown)
    }

    fn watch(
        &self,
        collection: Collection,
        config: WatchConfig,
        shutdown: watch::Receiver<bool>,
    ) -> WatchHandle {
        let source: Arc<dyn ChangeSource> = self.api.clone();
        spawn_watch(
            source,
            self.credentials.clone(),
            self.id.clone(),
            collection,
            config,
            shutdown,
        )
    }
}

fn verify_all(records: &[MessageRecord]) -> Result<Vec<Message>> {
    records
        .iter()
        .map(|record| verify_and_decode(record).map_err(ClientError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use hubmail_shared::protocol::{
        ListMessagesResponse, NewMailboxResponse, ReadInboxMessageResponse, SendMessageResponse,
    };
    use hubmail_shared::{CodecError, Identity, IdentityToken};

    use super::*;

    /// Records whatever the facade submits and replays canned pages.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<SendMessageRequest>>,
        listed: Mutex<Vec<ListInboxMessagesRequest>>,
        page: Mutex<Vec<MessageRecord>>,
    }

    #[async_trait]
    impl MailApi for Recorder {
        async fn new_mailbox(&self, _token: &IdentityToken) -> Result<NewMailboxResponse> {
            Ok(NewMailboxResponse {
                mailbox: MailboxId::random().to_hex(),
            })
        }

        async fn send_message(
            &self,
            _token: &IdentityToken,
            req: &SendMessageRequest,
        ) -> Result<SendMessageResponse> {
            self.sent.lock().unwrap().push(req.clone());
            Ok(SendMessageResponse {
                id: MessageId::new().to_string(),
                created_at: 5,
            })
        }

        async fn list_inbox_messages(
            &self,
            _token: &IdentityToken,
            req: &ListInboxMessagesRequest,
        ) -> Result<ListMessagesResponse> {
            self.listed.lock().unwrap().push(req.clone());
            Ok(ListMessagesResponse {
                messages: self.page.lock().unwrap().clone(),
            })
        }

        async fn list_sentbox_messages(
            &self,
            _token: &IdentityToken,
            _req: &ListSentboxMessagesRequest,
        ) -> Result<ListMessagesResponse> {
            Ok(ListMessagesResponse { messages: vec![] })
        }

        async fn read_inbox_message(
            &self,
            _token: &IdentityToken,
            _req: &MessageRequest,
        ) -> Result<ReadInboxMessageResponse> {
            Ok(ReadInboxMessageResponse { read_at: 9 })
        }

        async fn delete_inbox_message(
            &self,
            _token: &IdentityToken,
            _req: &MessageRequest,
        ) -> Result<()> {
            Err(ClientError::NotFound("Message not found".into()))
        }

        async fn delete_sentbox_message(
            &self,
            _token: &IdentityToken,
            _req: &MessageRequest,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn credentials(identity: &Identity) -> Credentials {
        Credentials::new(identity.clone(), "test", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_send_submits_both_sealed_copies() {
        let api = Arc::new(Recorder::default());
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let mailbox = Mailbox::create(api.clone(), credentials(&alice)).await.unwrap();

        let sent = mailbox
            .send_message(&bob.public_key().to_did(), b"hi")
            .await
            .unwrap();
        assert_eq!(sent.created_at.timestamp_nanos_opt(), Some(5));

        let req = api.sent.lock().unwrap()[0].clone();
        assert_eq!(req.mailbox, mailbox.id().to_hex());
        assert_eq!(req.to, bob.public_key().to_hex());
        assert_eq!(bob.open(&req.to_body).unwrap(), b"hi");
        assert_eq!(alice.open(&req.from_body).unwrap(), b"hi");
        alice
            .public_key()
            .verify(&req.to_body, &req.to_signature)
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_rejects_bad_recipient_before_rpc() {
        let api = Arc::new(Recorder::default());
        let mailbox = Mailbox::open(api.clone(), credentials(&Identity::generate()), MailboxId::random());

        let err = mailbox.send_message("bogus", b"x").await.unwrap_err();
        assert!(matches!(err, ClientError::Codec(CodecError::InvalidRecipientKey(_))));
        assert!(api.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_passes_options_and_verifies() {
        let api = Arc::new(Recorder::default());
        let (alice, bob) = (Identity::generate(), Identity::generate());
        let mailbox = Mailbox::open(api.clone(), credentials(&bob), MailboxId::random());

        let out = build_send(&alice, &bob.public_key().to_hex(), b"page").unwrap();
        let good = MessageRecord::from_envelope(
            &MessageId::new(),
            &alice.public_key(),
            &out.to,
            &out.inbox,
            1,
            Some(0),
        );
        *api.page.lock().unwrap() = vec![good.clone()];

        let cursor = MessageId::new();
        let options = ListOptions::new()
            .seek(&cursor)
            .limit(20)
            .ascending(true)
            .status(MessageStatus::Unread);
        let messages = mailbox.list_inbox_messages(&options).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].open(&bob).unwrap(), b"page");

        let req = api.listed.lock().unwrap()[0].clone();
        assert_eq!(req.seek, cursor.to_string());
        assert_eq!(req.limit, 20);
        assert!(req.ascending);
        assert_eq!(req.status, MessageStatus::Unread.to_wire());

        // One forged record fails the whole page.
        let mut forged = good.clone();
        forged.from = Identity::generate().public_key().to_did();
        *api.page.lock().unwrap() = vec![good, forged];
        assert!(matches!(
            mailbox.list_inbox_messages(&ListOptions::new()).await,
            Err(ClientError::Codec(CodecError::BadSignature))
        ));
    }

    #[tokio::test]
    async fn test_read_and_delete() {
        let api = Arc::new(Recorder::default());
        let mailbox = Mailbox::open(api, credentials(&Identity::generate()), MailboxId::random());
        let id = MessageId::new();

        let read_at = mailbox.read_inbox_message(&id).await.unwrap();
        assert_eq!(read_at.timestamp_nanos_opt(), Some(9));

        assert!(matches!(
            mailbox.delete_inbox_message(&id).await,
            Err(ClientError::NotFound(_))
        ));
        mailbox.delete_sentbox_message(&id).await.unwrap();
    }

    #[test]
    fn test_list_options_after() {
        let alice = Identity::generate();
        let out = build_send(&alice, &alice.public_key().to_hex(), b"x").unwrap();
        let id = MessageId::new();
        let record =
            MessageRecord::from_envelope(&id, &alice.public_key(), &out.to, &out.sentbox, 1, None);
        let message = verify_and_decode(&record).unwrap();

        let options = ListOptions::new().after(&message);
        assert_eq!(options.seek, id.to_string());
        assert_eq!(options.limit, 0);
        assert_eq!(options.status, MessageStatus::Unspecified);
    }
}
