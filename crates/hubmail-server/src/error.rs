use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hubmail_shared::protocol::ErrorResponse;
use hubmail_shared::TokenError;
use thiserror::Error;

use crate::mail::MailError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] TokenError),

    #[error("Missing bearer token")]
    MissingToken,

    #[error(transparent)]
    Mail(#[from] MailError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthenticated(_) | ServerError::MissingToken => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::Mail(e) => match e {
                MailError::InvalidKey(_) | MailError::Query(_) => StatusCode::PRECONDITION_FAILED,
                MailError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                MailError::BadSignature => StatusCode::UNAUTHORIZED,
                MailError::Forbidden => StatusCode::FORBIDDEN,
                MailError::MailboxNotFound
                | MailError::RecipientNotFound
                | MailError::MessageNotFound => StatusCode::NOT_FOUND,
                MailError::MailboxExists => StatusCode::CONFLICT,
                MailError::PartialSend { .. } | MailError::Corrupt(_) | MailError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut id = None;
        let error = match &self {
            // Store internals stay in the logs.
            ServerError::Mail(MailError::Store(e)) => {
                tracing::error!(error = %e, "store failure");
                "Internal server error".to_string()
            }
            ServerError::Mail(MailError::Corrupt(e)) => {
                tracing::error!(error = %e, "corrupt record");
                "Internal server error".to_string()
            }
            ServerError::Mail(MailError::PartialSend { id: sent, source }) => {
                tracing::error!(id = %sent, error = %source, "partial send");
                id = Some(sent.clone());
                "Message delivered but sentbox write failed".to_string()
            }
            other => other.to_string(),
        };

        (status, axum::Json(ErrorResponse { error, id })).into_response()
    }
}
