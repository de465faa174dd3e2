//! The mail RPC surface as seen by a client.

use async_trait::async_trait;
use hubmail_shared::protocol::{
    ListInboxMessagesRequest, ListMessagesResponse, ListSentboxMessagesRequest, MessageRequest,
    NewMailboxResponse, ReadInboxMessageResponse, SendMessageRequest, SendMessageResponse,
};
use hubmail_shared::IdentityToken;

use crate::error::Result;

/// One method per RPC. Every call carries a freshly minted token.
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn new_mailbox(&self, token: &IdentityToken) -> Result<NewMailboxResponse>;

    async fn send_message(
        &self,
        token: &IdentityToken,
        req: &SendMessageRequest,
    ) -> Result<SendMessageResponse>;

    async fn list_inbox_messages(
        &self,
        token: &IdentityToken,
        req: &ListInboxMessagesRequest,
    ) -> Result<ListMessagesResponse>;

    async fn list_sentbox_messages(
        &self,
        token: &IdentityToken,
        req: &ListSentboxMessagesRequest,
    ) -> Result<ListMessagesResponse>;

    async fn read_inbox_message(
        &self,
        token: &IdentityToken,
        req: &MessageRequest,
    ) -> Result<ReadInboxMessageResponse>;

    async fn delete_inbox_message(&self, token: &IdentityToken, req: &MessageRequest)
        -> Result<()>;

    async fn delete_sentbox_message(
        &self,
        token: &IdentityToken,
        req: &MessageRequest,
    ) -> Result<()>;
}
