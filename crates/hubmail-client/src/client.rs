//! HTTP transport for [`MailApi`] and [`ChangeSource`].

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use hubmail_shared::protocol::{
    ChangeEvent, ErrorResponse, ListInboxMessagesRequest, ListMessagesResponse,
    ListSentboxMessagesRequest, MessageRequest, NewMailboxResponse, ReadInboxMessageResponse,
    SendMessageRequest, SendMessageResponse,
};
use hubmail_shared::{Collection, IdentityToken, MailboxId};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::MailApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::watch::{ChangeFeed, ChangeSource, WatchError};

#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: std::time::Duration,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, token: &IdentityToken, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "rpc");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.encode()?)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }
}

/// Turn a non-success response into the matching [`ClientError`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorResponse>(&text).unwrap_or(ErrorResponse {
        error: text,
        id: None,
    });
    Err(ClientError::from_response(status, body))
}

#[async_trait]
impl MailApi for HttpClient {
    async fn new_mailbox(&self, token: &IdentityToken) -> Result<NewMailboxResponse> {
        self.post("/v1/mailboxes", token, &serde_json::json!({})).await
    }

    async fn send_message(
        &self,
        token: &IdentityToken,
        req: &SendMessageRequest,
    ) -> Result<SendMessageResponse> {
        self.post("/v1/messages/send", token, req).await
    }

    async fn list_inbox_messages(
        &self,
        token: &IdentityToken,
        req: &ListInboxMessagesRequest,
    ) -> Result<ListMessagesResponse> {
        self.post("/v1/inbox/list", token, req).await
    }

    async fn list_sentbox_messages(
        &self,
        token: &IdentityToken,
        req: &ListSentboxMessagesRequest,
    ) -> Result<ListMessagesResponse> {
        self.post("/v1/sentbox/list", token, req).await
    }

    async fn read_inbox_message(
        &self,
        token: &IdentityToken,
        req: &MessageRequest,
    ) -> Result<ReadInboxMessageResponse> {
        self.post("/v1/inbox/read", token, req).await
    }

    async fn delete_inbox_message(&self, token: &IdentityToken, req: &MessageRequest) -> Result<()> {
        let _: serde_json::Value = self.post("/v1/inbox/delete", token, req).await?;
        Ok(())
    }

    async fn delete_sentbox_message(
        &self,
        token: &IdentityToken,
        req: &MessageRequest,
    ) -> Result<()> {
        let _: serde_json::Value = self.post("/v1/sentbox/delete", token, req).await?;
        Ok(())
    }
}

#[async_trait]
impl ChangeSource for HttpClient {
    async fn subscribe(
        &self,
        token: &IdentityToken,
        mailbox: &MailboxId,
        collection: Collection,
    ) -> std::result::Result<ChangeFeed, WatchError> {
        let url = format!("{}/v1/watch/{}", self.base_url, collection);
        let token = token.encode()?;

        let response = self
            .http
            .get(&url)
            .query(&[("mailbox", mailbox.to_hex())])
            .bearer_auth(token)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(ClientError::from)?;
        let response = check(response).await?;

        debug!(%url, "change feed open");
        Ok(sse_changes(response.bytes_stream()))
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines anywhere.
#[derive(Debug, Default)]
struct SseParser {
    buf: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(SseEvent {
                        event: std::mem::take(&mut self.event),
                        data: std::mem::take(&mut self.data).join("\n"),
                    });
                }
                self.event.clear();
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event = value.to_string(),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        out
    }
}

fn to_change(event: SseEvent) -> std::result::Result<ChangeEvent, WatchError> {
    match event.event.as_str() {
        "change" => serde_json::from_str(&event.data)
            .map_err(|e| WatchError::Fatal(format!("malformed change: {e}"))),
        "error" => Err(WatchError::Connection(event.data)),
        other => Err(WatchError::Fatal(format!("unexpected event: {other}"))),
    }
}

fn sse_changes<S>(bytes: S) -> ChangeFeed
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = (Box::pin(bytes), SseParser::default(), VecDeque::new());
    stream::unfold(Some(state), |state| async move {
        let (mut bytes, mut parser, mut pending) = state?;
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, Some((bytes, parser, pending))));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(parser.push(&chunk).into_iter().map(to_change)),
                Some(Err(e)) => return Some((Err(WatchError::Connection(e.to_string())), None)),
                None => return None,
            }
        }
    })
    .boxed()
}
