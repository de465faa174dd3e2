use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use hubmail_shared::envelope::Envelope;
use hubmail_shared::protocol::{
    ListInboxMessagesRequest, ListMessagesResponse, ListSentboxMessagesRequest, MessageRequest,
    NewMailboxResponse, ReadInboxMessageResponse, SendMessageRequest, SendMessageResponse,
};
use hubmail_shared::{Collection, MailboxId};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::authenticate;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::mail::{Mail, Submission};

#[derive(Clone)]
pub struct AppState {
    pub mail: Arc<Mail>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    fn caller(&self, headers: &HeaderMap) -> Result<hubmail_shared::PublicKey, ServerError> {
        authenticate(headers, &self.config.service_audience)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/mailboxes", post(new_mailbox))
        .route("/v1/messages/send", post(send_message))
        .route("/v1/inbox/list", post(list_inbox_messages))
        .route("/v1/sentbox/list", post(list_sentbox_messages))
        .route("/v1/inbox/read", post(read_inbox_message))
        .route("/v1/inbox/delete", post(delete_inbox_message))
        .route("/v1/sentbox/delete", post(delete_sentbox_message))
        .route("/v1/watch/:collection", get(watch))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct WatchParams {
    mailbox: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn parse_mailbox(mailbox: &str) -> Result<MailboxId, ServerError> {
    MailboxId::parse(mailbox).map_err(|e| ServerError::BadRequest(e.to_string()))
}

async fn new_mailbox(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<NewMailboxResponse>, ServerError> {
    let caller = state.caller(&headers)?;
    let id = state.mail.new_mailbox(&caller).await?;
    Ok(Json(NewMailboxResponse {
        mailbox: id.to_hex(),
    }))
}

async fn send_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ServerError> {
    let mailbox = parse_mailbox(&req.mailbox)?;
    let caller = state.caller(&headers)?;

    let submission = Submission {
        to: req.to,
        inbox: Envelope {
            body: req.to_body,
            signature: req.to_signature,
        },
        sentbox: Envelope {
            body: req.from_body,
            signature: req.from_signature,
        },
    };
    let sent = state.mail.send_message(&caller, &mailbox, submission).await?;

    Ok(Json(SendMessageResponse {
        id: sent.id.to_string(),
        created_at: sent.created_at,
    }))
}

async fn list_inbox_messages(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ListInboxMessagesRequest>,
) -> Result<Json<ListMessagesResponse>, ServerError> {
    let mailbox = parse_mailbox(&req.mailbox)?;
    let caller = state.caller(&headers)?;
    let messages = state
        .mail
        .list_inbox_messages(&caller, &mailbox, &req.seek, req.limit, req.ascending, req.status)
        .await?;
    Ok(Json(ListMessagesResponse { messages }))
}

async fn list_sentbox_messages(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ListSentboxMessagesRequest>,
) -> Result<Json<ListMessagesResponse>, ServerError> {
    let mailbox = parse_mailbox(&req.mailbox)?;
    let caller = state.caller(&headers)?;
    let messages = state
        .mail
        .list_sentbox_messages(&caller, &mailbox, &req.seek, req.limit, req.ascending)
        .await?;
    Ok(Json(ListMessagesResponse { messages }))
}

async fn read_inbox_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<ReadInboxMessageResponse>, ServerError> {
    let mailbox = parse_mailbox(&req.mailbox)?;
    let caller = state.caller(&headers)?;
    let read_at = state
        .mail
        .read_inbox_message(&caller, &mailbox, &req.id)
        .await?;
    Ok(Json(ReadInboxMessageResponse { read_at }))
}

async fn delete_inbox_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let mailbox = parse_mailbox(&req.mailbox)?;
    let caller = state.caller(&headers)?;
    state
        .mail
        .delete_inbox_message(&caller, &mailbox, &req.id)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn delete_sentbox_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let mailbox = parse_mailbox(&req.mailbox)?;
    let caller = state.caller(&headers)?;
    state
        .mail
        .delete_sentbox_message(&caller, &mailbox, &req.id)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Stream a collection's change feed as server-sent events. Each `change`
/// event carries one JSON change; an `error` event precedes the end of a
/// broken feed.
async fn watch(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<WatchParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let collection = Collection::from_name(&collection)
        .ok_or_else(|| ServerError::BadRequest(format!("unknown collection: {collection}")))?;
    let mailbox = parse_mailbox(&params.mailbox)?;
    let caller = state.caller(&headers)?;

    let changes = state.mail.listen(&caller, &mailbox, collection).await?;
    info!(mailbox = %mailbox.short(), %collection, "watch opened");

    let events = changes.map(|change| {
        let event = match change {
            Ok(change) => match serde_json::to_string(&change) {
                Ok(data) => Event::default().event("change").data(data),
                Err(e) => Event::default().event("error").data(e.to_string()),
            },
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(state, listener).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(
    state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Starting HTTP API server");

    axum::serve(listener, app).await?;

    Ok(())
}
